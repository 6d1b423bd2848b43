//! In-process memcached stand-in for tests
//!
//! Speaks the binary protocol through memlink's own codec, requires SASL
//! PLAIN before serving data commands, and keeps items in a HashMap.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use memlink::protocol::{read_request, write_response, Opcode, Request, Response, Status};
use memlink::ClientConfig;

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "s3cret";

/// How the server treats data commands once a client is authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Normal,
    /// Read data commands but never answer them
    StallAfterAuth,
    /// Answer data commands with a wrong opaque token
    WrongOpaque,
    /// Stop reading the socket once the client is authenticated
    DeafAfterAuth,
}

#[derive(Debug, Clone)]
struct Item {
    flags: u32,
    value: Vec<u8>,
    cas: u64,
}

#[derive(Default)]
pub struct Stats {
    pub connections: AtomicUsize,
    pub frames: AtomicUsize,
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub stats: Arc<Stats>,
    store: Arc<Mutex<HashMap<Vec<u8>, Item>>>,
}

impl MockServer {
    pub fn start() -> Self {
        Self::start_with("PLAIN", Behavior::Normal)
    }

    pub fn start_with(mechanisms: &'static str, behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(Stats::default());
        let store = Arc::new(Mutex::new(HashMap::new()));

        let server_stats = Arc::clone(&stats);
        let server_store = Arc::clone(&store);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(s) => s,
                    Err(_) => break,
                };
                server_stats.connections.fetch_add(1, Ordering::SeqCst);
                let session = Session {
                    stats: Arc::clone(&server_stats),
                    store: Arc::clone(&server_store),
                    mechanisms,
                    behavior,
                    authenticated: false,
                    next_cas: 1,
                };
                thread::spawn(move || session.run(stream));
            }
        });

        Self { addr, stats, store }
    }

    pub fn config(&self) -> ClientConfig {
        self.config_builder().build().unwrap()
    }

    pub fn config_builder(&self) -> memlink::config::ClientConfigBuilder {
        ClientConfig::builder()
            .host(self.addr.ip().to_string())
            .port(self.addr.port())
            .credentials(USERNAME, PASSWORD)
            .op_timeout_ms(2000)
    }

    pub fn endpoint(&self) -> memlink::Endpoint {
        memlink::Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn frames(&self) -> usize {
        self.stats.frames.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.stats.connections.load(Ordering::SeqCst)
    }

    /// Store raw bytes as another client would
    pub fn put_raw(&self, key: &str, flags: u32, value: &[u8]) {
        self.store.lock().insert(
            key.as_bytes().to_vec(),
            Item {
                flags,
                value: value.to_vec(),
                cas: 0,
            },
        );
    }

    pub fn raw(&self, key: &str) -> Option<(u32, Vec<u8>)> {
        self.store
            .lock()
            .get(key.as_bytes())
            .map(|item| (item.flags, item.value.clone()))
    }
}

struct Session {
    stats: Arc<Stats>,
    store: Arc<Mutex<HashMap<Vec<u8>, Item>>>,
    mechanisms: &'static str,
    behavior: Behavior,
    authenticated: bool,
    next_cas: u64,
}

impl Session {
    fn run(mut self, stream: TcpStream) {
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);

        while let Ok(request) = read_request(&mut reader) {
            self.stats.frames.fetch_add(1, Ordering::SeqCst);

            let is_data = !matches!(
                request.opcode(),
                Opcode::SaslListMechs | Opcode::SaslAuth
            );
            if is_data && self.authenticated && self.behavior == Behavior::StallAfterAuth {
                continue;
            }

            let mut response = self.handle(&request).with_opaque(request.opaque());
            if is_data && self.authenticated && self.behavior == Behavior::WrongOpaque {
                response = response.with_opaque(request.opaque().wrapping_add(1000));
            }

            if write_response(&mut writer, &response).is_err() {
                break;
            }
            if self.authenticated && self.behavior == Behavior::DeafAfterAuth {
                // Hold the socket open so the client's writes back up
                thread::sleep(Duration::from_secs(5));
                break;
            }
            if request.opcode() == Opcode::Quit {
                break;
            }
        }
    }

    fn handle(&mut self, request: &Request) -> Response {
        let opcode = request.opcode();
        match opcode {
            Opcode::SaslListMechs => {
                return Response::ok(opcode).with_value(self.mechanisms.as_bytes().to_vec())
            }
            Opcode::SaslAuth => {
                let expected = format!("\0{}\0{}", USERNAME, PASSWORD);
                return if request.key() == b"PLAIN" && request.value() == expected.as_bytes() {
                    self.authenticated = true;
                    Response::ok(opcode).with_value(b"Authenticated".to_vec())
                } else {
                    Response::new(opcode, Status::SaslAuthError).with_value(b"Auth failure".to_vec())
                };
            }
            _ => {}
        }

        if !self.authenticated {
            return Response::error(opcode, Status::SaslAuthError);
        }

        let key = request.key().to_vec();
        let store = Arc::clone(&self.store);
        let mut store = store.lock();
        match opcode {
            Opcode::Get | Opcode::GetAndTouch => match store.get(&key) {
                Some(item) => Response::ok(opcode)
                    .with_extras(item.flags.to_be_bytes().to_vec())
                    .with_value(item.value.clone())
                    .with_cas(item.cas),
                None => Response::error(opcode, Status::KeyNotFound),
            },
            Opcode::Set | Opcode::Add | Opcode::Replace => {
                let exists = store.contains_key(&key);
                if opcode == Opcode::Add && exists {
                    return Response::error(opcode, Status::KeyExists);
                }
                if opcode == Opcode::Replace && !exists {
                    return Response::error(opcode, Status::KeyNotFound);
                }
                let flags = request.flags().unwrap_or(0);
                let cas = self.bump_cas();
                store.insert(
                    key,
                    Item {
                        flags,
                        value: request.value().to_vec(),
                        cas,
                    },
                );
                Response::ok(opcode).with_cas(cas)
            }
            Opcode::Delete => match store.remove(&key) {
                Some(_) => Response::ok(opcode),
                None => Response::error(opcode, Status::KeyNotFound),
            },
            Opcode::Touch => {
                if store.contains_key(&key) {
                    Response::ok(opcode)
                } else {
                    Response::error(opcode, Status::KeyNotFound)
                }
            }
            Opcode::Append | Opcode::Prepend => match store.get_mut(&key) {
                Some(item) => {
                    if opcode == Opcode::Append {
                        item.value.extend_from_slice(request.value());
                    } else {
                        let mut value = request.value().to_vec();
                        value.extend_from_slice(&item.value);
                        item.value = value;
                    }
                    Response::ok(opcode)
                }
                None => Response::error(opcode, Status::ItemNotStored),
            },
            Opcode::Increment | Opcode::Decrement => {
                let extras = request.extras();
                let delta = u64::from_be_bytes(extras[0..8].try_into().unwrap());
                let initial = u64::from_be_bytes(extras[8..16].try_into().unwrap());
                let expiry = u32::from_be_bytes(extras[16..20].try_into().unwrap());

                let next = match store.get(&key) {
                    None if expiry == 0xffff_ffff => {
                        return Response::error(opcode, Status::KeyNotFound)
                    }
                    None => initial,
                    Some(item) => {
                        let current = match std::str::from_utf8(&item.value)
                            .ok()
                            .and_then(|s| s.parse::<u64>().ok())
                        {
                            Some(n) => n,
                            None => return Response::error(opcode, Status::NonNumeric),
                        };
                        if opcode == Opcode::Increment {
                            current.wrapping_add(delta)
                        } else {
                            current.saturating_sub(delta)
                        }
                    }
                };
                let cas = self.bump_cas();
                store.insert(
                    key,
                    Item {
                        flags: 0,
                        value: next.to_string().into_bytes(),
                        cas,
                    },
                );
                Response::ok(opcode).with_value(next.to_be_bytes().to_vec())
            }
            Opcode::Flush => {
                store.clear();
                Response::ok(opcode)
            }
            Opcode::Version => Response::ok(opcode).with_value(b"1.6.21-mock".to_vec()),
            Opcode::NoOp | Opcode::Quit => Response::ok(opcode),
            Opcode::SaslListMechs | Opcode::SaslAuth => unreachable!(),
        }
    }

    fn bump_cas(&mut self) -> u64 {
        let cas = self.next_cas;
        self.next_cas += 1;
        cas
    }
}

/// A peer that accepts connections and never writes a byte
pub struct SilentServer {
    pub addr: SocketAddr,
}

impl SilentServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                match stream {
                    Ok(s) => held.push(s),
                    Err(_) => break,
                }
            }
        });
        Self { addr }
    }

    pub fn endpoint(&self) -> memlink::Endpoint {
        memlink::Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }
}
