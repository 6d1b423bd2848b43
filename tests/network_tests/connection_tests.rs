//! Connection Tests
//!
//! Handshake, auth gating, ordering and failure states against an in-process
//! server.

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;

use common::{Behavior, MockServer, SilentServer, PASSWORD, USERNAME};
use memlink::config::{Credentials, Timeouts};
use memlink::network::{Connection, ConnectionState};
use memlink::protocol::{build_get_request, build_noop_request, build_set_request, Opcode, Status};
use memlink::CacheError;

fn credentials() -> Credentials {
    Credentials::new(USERNAME, PASSWORD)
}

fn short_timeouts(op_ms: u64) -> Timeouts {
    Timeouts {
        connect: Duration::from_secs(2),
        op: Duration::from_millis(op_ms),
    }
}

// =============================================================================
// Authentication Tests
// =============================================================================

#[test]
fn test_connect_starts_unauthenticated() {
    let server = MockServer::start();
    let connection = Connection::connect(&server.endpoint(), &Timeouts::default()).unwrap();

    assert_eq!(connection.state(), ConnectionState::Unauthenticated);
    assert!(!connection.is_ready());
}

#[test]
fn test_authenticate_success() {
    let server = MockServer::start();
    let mut connection = Connection::connect(&server.endpoint(), &Timeouts::default()).unwrap();

    connection.authenticate(&credentials()).unwrap();

    assert_eq!(connection.state(), ConnectionState::Ready);
    // LIST_MECHS + AUTH
    assert_eq!(server.frames(), 2);
}

#[test]
fn test_authenticate_twice_is_noop() {
    let server = MockServer::start();
    let mut connection =
        Connection::open(&server.endpoint(), &Timeouts::default(), &credentials()).unwrap();

    connection.authenticate(&credentials()).unwrap();
    assert_eq!(server.frames(), 2);
}

#[test]
fn test_wrong_password_closes_connection() {
    let server = MockServer::start();
    let mut connection = Connection::connect(&server.endpoint(), &Timeouts::default()).unwrap();

    let err = connection
        .authenticate(&Credentials::new(USERNAME, "wrong"))
        .unwrap_err();

    assert!(matches!(err, CacheError::Auth(_)), "got {:?}", err);
    assert_eq!(connection.state(), ConnectionState::Closed);

    // A closed connection can't be re-authenticated
    assert!(matches!(
        connection.authenticate(&credentials()),
        Err(CacheError::NotConnected(_))
    ));
}

#[test]
fn test_plain_not_offered() {
    let server = MockServer::start_with("CRAM-MD5 SCRAM-SHA-1", Behavior::Normal);
    let mut connection = Connection::connect(&server.endpoint(), &Timeouts::default()).unwrap();

    let err = connection.authenticate(&credentials()).unwrap_err();

    assert!(matches!(err, CacheError::Auth(_)));
    assert!(err.to_string().contains("PLAIN"));
    // No credentials were sent
    assert_eq!(server.frames(), 1);
}

#[test]
fn test_send_before_authenticate_writes_nothing() {
    let server = MockServer::start();
    let mut connection = Connection::connect(&server.endpoint(), &Timeouts::default()).unwrap();

    let err = connection
        .send_and_receive(build_get_request("key1").unwrap())
        .unwrap_err();

    assert!(matches!(err, CacheError::NotConnected(_)));
    assert_eq!(connection.state(), ConnectionState::Unauthenticated);
    assert_eq!(server.frames(), 0);
}

// =============================================================================
// Request/Response Tests
// =============================================================================

#[test]
fn test_responses_match_requests_in_order() {
    let server = MockServer::start();
    let mut connection =
        Connection::open(&server.endpoint(), &Timeouts::default(), &credentials()).unwrap();

    for i in 0..20 {
        let key = format!("key{}", i);
        let set = connection
            .send_and_receive(build_set_request(&key, 0, 0, vec![i as u8]).unwrap())
            .unwrap();
        assert_eq!(set.opcode, Opcode::Set);
        assert!(set.is_ok());

        let get = connection
            .send_and_receive(build_get_request(&key).unwrap())
            .unwrap();
        assert_eq!(get.opcode, Opcode::Get);
        assert_eq!(get.value, vec![i as u8]);
    }
}

#[test]
fn test_status_errors_leave_connection_ready() {
    let server = MockServer::start();
    let mut connection =
        Connection::open(&server.endpoint(), &Timeouts::default(), &credentials()).unwrap();

    let response = connection
        .send_and_receive(build_get_request("missing").unwrap())
        .unwrap();

    assert_eq!(response.status, Status::KeyNotFound);
    assert!(connection.is_ready());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_connect_refused() {
    // Bind then drop to get a port nobody listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint = memlink::Endpoint::new("127.0.0.1", port);

    let err = Connection::connect(&endpoint, &Timeouts::default()).unwrap_err();
    assert!(matches!(err, CacheError::Io(_)));
}

#[test]
fn test_handshake_timeout() {
    let server = SilentServer::start();
    let mut connection = Connection::connect(&server.endpoint(), &short_timeouts(1)).unwrap();

    let err = connection.authenticate(&credentials()).unwrap_err();

    assert!(matches!(err, CacheError::Timeout(1)));
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn test_timeout_degrades_connection() {
    let server = MockServer::start_with("PLAIN", Behavior::StallAfterAuth);
    let mut connection =
        Connection::open(&server.endpoint(), &short_timeouts(100), &credentials()).unwrap();

    let err = connection
        .send_and_receive(build_get_request("key1").unwrap())
        .unwrap_err();

    assert!(matches!(err, CacheError::Timeout(100)));
    assert!(connection.is_degraded());

    // Degraded connections refuse further requests without writing
    let frames = server.frames();
    assert!(matches!(
        connection.send_and_receive(build_noop_request()),
        Err(CacheError::NotConnected(_))
    ));
    assert_eq!(server.frames(), frames);
}

#[test]
fn test_write_timeout_is_timeout() {
    let server = MockServer::start_with("PLAIN", Behavior::DeafAfterAuth);
    let mut connection =
        Connection::open(&server.endpoint(), &short_timeouts(200), &credentials()).unwrap();

    // Far more than the socket buffers hold, so the write blocks
    let payload = vec![0x5a; 64 * 1024 * 1024];
    let err = connection
        .send_and_receive(build_set_request("big", 0, 0, payload).unwrap())
        .unwrap_err();

    assert!(matches!(err, CacheError::Timeout(200)), "got {:?}", err);
    assert!(connection.is_degraded());
}

#[test]
fn test_wrong_opaque_is_protocol_error() {
    let server = MockServer::start_with("PLAIN", Behavior::WrongOpaque);
    let mut connection =
        Connection::open(&server.endpoint(), &Timeouts::default(), &credentials()).unwrap();

    let err = connection.send_and_receive(build_noop_request()).unwrap_err();

    assert!(matches!(err, CacheError::Protocol(_)));
    assert!(connection.is_degraded());
}

#[test]
fn test_close() {
    let server = MockServer::start();
    let mut connection =
        Connection::open(&server.endpoint(), &Timeouts::default(), &credentials()).unwrap();

    connection.close().unwrap();

    assert_eq!(connection.state(), ConnectionState::Closed);
    // QUIT was sent
    assert_eq!(server.frames(), 3);
    assert!(matches!(
        connection.send_and_receive(build_noop_request()),
        Err(CacheError::NotConnected(_))
    ));
}
