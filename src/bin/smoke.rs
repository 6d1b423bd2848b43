//! memlink smoke test
//!
//! Loads a JSON config, authenticates, and round-trips a string, a map and a
//! nested record through the cache, printing what comes back.

use clap::Parser;
use memlink::{Client, ClientConfig, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// memlink smoke test
#[derive(Parser, Debug)]
#[command(name = "memlink-smoke")]
#[command(about = "Round-trip a few values through an authenticated memcached server")]
#[command(version)]
struct Args {
    /// Path to the JSON config (host, port, username, password)
    #[arg(short, long, default_value = "fixtures/config.json")]
    config: String,

    /// Override the request timeout (milliseconds)
    #[arg(short, long)]
    timeout_ms: Option<u64>,
}

struct Car {
    id: i32,
    color: String,
}

struct User {
    id: i64,
    name: String,
    desc: String,
    cars: Vec<Car>,
}

impl From<&Car> for Value {
    fn from(car: &Car) -> Self {
        Value::record(
            "Car",
            [
                ("id", Value::Int(car.id)),
                ("color", Value::from(car.color.as_str())),
            ],
        )
    }
}

impl From<&User> for Value {
    fn from(user: &User) -> Self {
        Value::record(
            "User",
            [
                ("id", Value::Long(user.id)),
                ("name", Value::from(user.name.as_str())),
                ("desc", Value::from(user.desc.as_str())),
                ("cars", Value::list(user.cars.iter().map(Value::from))),
            ],
        )
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,memlink=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("memlink smoke v{}", memlink::VERSION);
    tracing::info!("Config file: {}", args.config);

    if let Err(e) = run(&args) {
        tracing::error!("Smoke test failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> memlink::Result<()> {
    let mut config = ClientConfig::from_json_file(&args.config)?;
    if let Some(ms) = args.timeout_ms {
        config = config.to_builder().op_timeout_ms(ms).build()?;
    }
    tracing::info!("Server: {}", config.endpoint);

    let client = Client::connect(config)?;

    client.set("key1", 0, &Value::from("tangyao"))?;
    print_value("key1", client.get("key1")?);

    let map = Value::map([
        ("long", Value::Long(i64::MAX)),
        ("int", Value::Int(i32::MAX)),
        ("boolean", Value::Bool(true)),
    ]);
    client.set("key2", 0, &map)?;
    print_value("key2", client.get("key2")?);

    let user = User {
        id: 678001,
        name: "中文名".to_string(),
        desc: "这是备注 this is what?".to_string(),
        cars: vec![Car {
            id: 1,
            color: "#ffffff;".to_string(),
        }],
    };
    client.set("key3", 0, &Value::from(&user))?;
    print_value("key3", client.get("key3")?);

    client.close()
}

fn print_value(key: &str, value: Option<Value>) {
    match value {
        Some(value) => println!("{}: {}", key, value),
        None => println!("{}: <miss>", key),
    }
}
