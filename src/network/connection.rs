//! Connection
//!
//! One authenticated TCP transport to a cache server.
//!
//! ## State Machine
//! ```text
//!   connect()           authenticate()
//! ──────────► Unauthenticated ──► Authenticating ──ok──► Ready ──close()──► Closed
//!                                       │                  │
//!                                       └──fail──► Closed  └──timeout / bad frame──► Degraded
//! ```
//! Only a `Ready` connection sends requests. A `Degraded` connection may hold
//! half a response in its socket, so it is never reused: the caller
//! reconnects.

use std::fmt;
use std::io::{BufWriter, ErrorKind, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Instant;

use crate::config::{Credentials, Endpoint, Timeouts};
use crate::error::{CacheError, Result};
use crate::protocol::{
    build_quit_request, build_sasl_auth_request, build_sasl_list_mechs_request, write_request,
    FrameDecoder, Request, Response, Status, SASL_MECHANISM_PLAIN,
};

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open, handshake not started
    Unauthenticated,

    /// SASL exchange in progress
    Authenticating,

    /// Accepting requests
    Ready,

    /// A request timed out or the stream lost framing; reconnect required
    Degraded,

    /// Terminal
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unauthenticated => "unauthenticated",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A single connection to a cache server
pub struct Connection {
    /// Raw stream for reads (responses are reassembled by `decoder`)
    reader: TcpStream,

    /// Buffered write half
    writer: BufWriter<TcpStream>,

    /// Partial response frames
    decoder: FrameDecoder,

    endpoint: Endpoint,

    timeouts: Timeouts,

    state: ConnectionState,

    /// Next opaque token; echoed back by the server
    next_opaque: u32,
}

impl Connection {
    /// Open the transport to `endpoint`
    ///
    /// The returned connection is `Unauthenticated`.
    pub fn connect(endpoint: &Endpoint, timeouts: &Timeouts) -> Result<Self> {
        let addrs: Vec<_> = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()?
            .collect();

        let mut last_error = None;
        let mut stream = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeouts.connect) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        let stream = match (stream, last_error) {
            (Some(s), _) => s,
            (None, Some(e)) if is_timeout(&e) => {
                return Err(CacheError::Timeout(timeouts.connect.as_millis() as u64))
            }
            (None, Some(e)) => return Err(e.into()),
            (None, None) => {
                return Err(CacheError::Config(format!(
                    "{} resolved to no addresses",
                    endpoint
                )))
            }
        };

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(timeouts.op))?;

        let write_stream = stream.try_clone()?;

        tracing::debug!("Connected to {}", endpoint);

        Ok(Self {
            reader: stream,
            writer: BufWriter::new(write_stream),
            decoder: FrameDecoder::new(),
            endpoint: endpoint.clone(),
            timeouts: *timeouts,
            state: ConnectionState::Unauthenticated,
            next_opaque: 0,
        })
    }

    /// Connect and authenticate in one step
    pub fn open(endpoint: &Endpoint, timeouts: &Timeouts, credentials: &Credentials) -> Result<Self> {
        let mut connection = Self::connect(endpoint, timeouts)?;
        connection.authenticate(credentials)?;
        Ok(connection)
    }

    /// Perform the SASL PLAIN handshake
    ///
    /// On success the connection is `Ready`. On any failure it is `Closed`.
    pub fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        match self.state {
            ConnectionState::Unauthenticated => {}
            ConnectionState::Ready => {
                tracing::debug!("Connection to {} already authenticated", self.endpoint);
                return Ok(());
            }
            state => {
                return Err(CacheError::NotConnected(format!(
                    "cannot authenticate a {} connection",
                    state
                )))
            }
        }

        self.state = ConnectionState::Authenticating;
        match self.handshake(credentials) {
            Ok(()) => {
                self.state = ConnectionState::Ready;
                tracing::info!(
                    "Authenticated to {} as {}",
                    self.endpoint,
                    credentials.username
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Authentication to {} failed: {}", self.endpoint, e);
                self.shutdown();
                Err(e)
            }
        }
    }

    fn handshake(&mut self, credentials: &Credentials) -> Result<()> {
        let mechs = self.round_trip(build_sasl_list_mechs_request())?;
        if !mechs.is_ok() {
            return Err(CacheError::Auth(format!(
                "mechanism list rejected: {}",
                mechs.status.description()
            )));
        }

        let offered = String::from_utf8_lossy(&mechs.value);
        if !offered
            .split_whitespace()
            .any(|mech| mech == SASL_MECHANISM_PLAIN)
        {
            return Err(CacheError::Auth(format!(
                "server does not offer {} (offered: {:?})",
                SASL_MECHANISM_PLAIN, offered
            )));
        }

        let reply = self.round_trip(build_sasl_auth_request(
            &credentials.username,
            &credentials.password,
        ))?;
        match reply.status {
            Status::NoError => Ok(()),
            Status::AuthContinue | Status::SaslAuthContinue => Err(CacheError::Auth(
                "multi-step SASL exchange is not supported".to_string(),
            )),
            status => Err(CacheError::Auth(if reply.value.is_empty() {
                status.description().to_string()
            } else {
                String::from_utf8_lossy(&reply.value).into_owned()
            })),
        }
    }

    /// Send one request and wait for its response
    ///
    /// Refused with `NotConnected` unless the connection is `Ready`; nothing
    /// is written in that case. A timeout or framing error degrades the
    /// connection.
    pub fn send_and_receive(&mut self, request: Request) -> Result<Response> {
        if self.state != ConnectionState::Ready {
            return Err(CacheError::NotConnected(format!(
                "connection to {} is {}",
                self.endpoint, self.state
            )));
        }

        self.round_trip(request).map_err(|e| {
            if e.is_connection_fatal() {
                tracing::warn!("Connection to {} degraded: {}", self.endpoint, e);
                self.state = ConnectionState::Degraded;
            }
            e
        })
    }

    /// Write a request and read the matching response
    fn round_trip(&mut self, request: Request) -> Result<Response> {
        let opaque = self.next_opaque;
        self.next_opaque = self.next_opaque.wrapping_add(1);
        let request = request.with_opaque(opaque);

        tracing::trace!("Sending {:?} (opaque {}) to {}", request.opcode(), opaque, self.endpoint);
        write_request(&mut self.writer, &request).map_err(|e| match e {
            // The write timeout is the op timeout
            CacheError::Io(ref io) if is_timeout(io) => self.timeout_error(),
            e => e,
        })?;

        let response = self.read_response()?;
        if response.opaque != opaque {
            return Err(CacheError::Protocol(format!(
                "response out of order: expected opaque {}, got {}",
                opaque, response.opaque
            )));
        }
        if response.opcode != request.opcode() {
            return Err(CacheError::Protocol(format!(
                "response opcode {:?} does not match request {:?}",
                response.opcode,
                request.opcode()
            )));
        }

        tracing::trace!("Received {:?} for opaque {}", response.status, opaque);
        Ok(response)
    }

    /// Read until one complete frame is buffered or the op deadline passes
    fn read_response(&mut self) -> Result<Response> {
        let deadline = Instant::now() + self.timeouts.op;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(response) = self.decoder.decode_next()? {
                return Ok(response);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timeout_error());
            }
            self.reader.set_read_timeout(Some(remaining))?;

            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    return Err(CacheError::Io(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("connection closed by {}", self.endpoint),
                    )))
                }
                Ok(n) => self.decoder.extend(&chunk[..n]),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if is_timeout(e) => return Err(self.timeout_error()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn timeout_error(&self) -> CacheError {
        CacheError::Timeout(self.timeouts.op.as_millis() as u64)
    }

    /// Close the connection
    ///
    /// Sends QUIT when the connection is `Ready`; always ends `Closed`.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Ready {
            if let Err(e) = self.round_trip(build_quit_request()) {
                tracing::debug!("QUIT to {} failed: {}", self.endpoint, e);
            }
        }
        self.shutdown();
        tracing::debug!("Connection to {} closed", self.endpoint);
        Ok(())
    }

    fn shutdown(&mut self) {
        // The peer may already be gone
        let _ = self.reader.shutdown(Shutdown::Both);
        self.decoder.clear();
        self.state = ConnectionState::Closed;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn is_degraded(&self) -> bool {
        self.state == ConnectionState::Degraded
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("buffered", &self.decoder.buffered_len())
            .finish()
    }
}

/// Read timeouts surface as WouldBlock on Unix and TimedOut on Windows
fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
