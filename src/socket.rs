//! SBDP stream transport.
//!
//! [`Socket`] wraps one TCP endpoint through its whole lifecycle and moves
//! whole [`Message`]s over it using the length-prefixed frame format from
//! [`crate::codec`]. Lifecycle setup steps (create, bind, listen, connect)
//! report failure as `false` so callers can probe ports and peers without
//! error-handling control flow; mid-session I/O (accept, send, recv) raises
//! [`SbdpError`] instead.
//!
//! A socket is driven by one task at a time; a listening socket can hand each
//! accepted connection to its own task.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use futures::SinkExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::{timeout, Duration};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::SbdpCodec;
use crate::types::{Message, SbdpError};

const LISTEN_BACKLOG: u32 = 128;

enum SocketState {
    Unopened,
    Created(TcpSocket),
    Bound(TcpSocket),
    Listening(TcpListener),
    Connected(Framed<TcpStream, SbdpCodec>),
    Closed,
}

/// One SBDP endpoint.
///
/// ```text
/// Unopened -> Created -> Bound -> Listening   (server side, accept() loop)
///                     -> Connected            (client side, or from accept())
/// any state -> Closed                         (idempotent)
/// ```
pub struct Socket {
    state: SocketState,
}

impl Default for Socket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket {
    /// Returns a socket in the `Unopened` state; call [`create`](Self::create)
    /// before anything else.
    pub fn new() -> Self {
        Self {
            state: SocketState::Unopened,
        }
    }

    /// Allocates the underlying stream-socket resource.
    ///
    /// Returns `false` on local resource exhaustion. Any previously held
    /// resource is released first.
    pub fn create(&mut self) -> bool {
        match TcpSocket::new_v4() {
            Ok(sock) => {
                self.state = SocketState::Created(sock);
                true
            }
            Err(e) => {
                warn!(error = %e, "socket allocation failed");
                self.state = SocketState::Closed;
                false
            }
        }
    }

    /// Reserves a local port on a created socket.
    ///
    /// Returns `false` if the port is already taken or the socket is not in
    /// the `Created` state. Port 0 asks the OS for a free port; read it back
    /// with [`local_addr`](Self::local_addr).
    pub fn bind(&mut self, port: u16) -> bool {
        match std::mem::replace(&mut self.state, SocketState::Closed) {
            SocketState::Created(sock) => {
                let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
                match sock.bind(addr) {
                    Ok(()) => {
                        debug!(%addr, "socket bound");
                        self.state = SocketState::Bound(sock);
                        true
                    }
                    Err(e) => {
                        debug!(%addr, error = %e, "bind failed");
                        // The socket stays usable for another bind attempt.
                        self.state = SocketState::Created(sock);
                        false
                    }
                }
            }
            other => {
                debug!("bind called on a socket that is not freshly created");
                self.state = other;
                false
            }
        }
    }

    /// Starts listening on a bound socket. Returns `false` if the socket is
    /// not bound or the OS refuses.
    pub fn listen(&mut self) -> bool {
        match std::mem::replace(&mut self.state, SocketState::Closed) {
            SocketState::Bound(sock) => match sock.listen(LISTEN_BACKLOG) {
                Ok(listener) => {
                    if let Ok(addr) = listener.local_addr() {
                        info!(%addr, "listening");
                    }
                    self.state = SocketState::Listening(listener);
                    true
                }
                Err(e) => {
                    warn!(error = %e, "listen failed");
                    false
                }
            },
            other => {
                debug!("listen called on a socket that is not bound");
                self.state = other;
                false
            }
        }
    }

    /// Waits for one inbound connection and returns it as a new connected
    /// socket. The listening socket stays listening and can accept again.
    pub async fn accept(&mut self) -> Result<Socket, SbdpError> {
        let SocketState::Listening(listener) = &self.state else {
            return Err(SbdpError::NotListening);
        };

        let (stream, peer) = listener.accept().await?;
        info!(%peer, "accepted connection");
        Ok(Socket {
            state: SocketState::Connected(Framed::new(stream, SbdpCodec::new())),
        })
    }

    /// Attempts to reach a listening peer.
    ///
    /// `host` may be an IP literal or a resolvable name. Returns `false` on
    /// refusal, unreachability, or a name that does not resolve; the socket
    /// must be recreated before another attempt, since a failed connect
    /// leaves the underlying resource unusable.
    pub async fn connect(&mut self, host: &str, port: u16) -> bool {
        let Some(peer) = resolve_v4(host, port).await else {
            debug!(host, port, "connect failed: address did not resolve");
            return false;
        };
        match std::mem::replace(&mut self.state, SocketState::Closed) {
            SocketState::Created(sock) => match sock.connect(peer).await {
                Ok(stream) => {
                    info!(%peer, "connected");
                    self.state = SocketState::Connected(Framed::new(stream, SbdpCodec::new()));
                    true
                }
                Err(e) => {
                    debug!(%peer, error = %e, "connect failed");
                    false
                }
            },
            other => {
                debug!("connect called on a socket that is not freshly created");
                self.state = other;
                false
            }
        }
    }

    /// Releases the underlying resource. Safe to call in any state, any
    /// number of times; all later I/O on this socket fails deterministically.
    pub fn close(&mut self) {
        if !matches!(self.state, SocketState::Closed | SocketState::Unopened) {
            debug!("socket closed");
        }
        self.state = SocketState::Closed;
    }

    /// Encodes `msg` and writes the whole frame to the connected peer.
    ///
    /// Raises [`SbdpError::NotConnected`] when no connection is established
    /// and [`SbdpError::ConnectionClosed`] when the peer has reset or closed.
    pub async fn send_message(&mut self, msg: &Message) -> Result<(), SbdpError> {
        let SocketState::Connected(framed) = &mut self.state else {
            return Err(SbdpError::NotConnected);
        };

        debug!(entries = msg.len(), "sending message");
        framed.send(msg).await.map_err(map_stream_err)
    }

    /// Receives one whole message, waiting at most `timeout_ms` milliseconds.
    ///
    /// The deadline spans however many partial reads the frame needs. Three
    /// failure shapes: [`SbdpError::TimedOut`] when the deadline elapses,
    /// [`SbdpError::ConnectionClosed`] when the peer closes before a full
    /// frame, and [`SbdpError::MalformedMessage`] from the codec, propagated
    /// unchanged.
    pub async fn recv_message(&mut self, timeout_ms: u64) -> Result<Message, SbdpError> {
        let SocketState::Connected(framed) = &mut self.state else {
            return Err(SbdpError::NotConnected);
        };

        match timeout(Duration::from_millis(timeout_ms), framed.try_next()).await {
            Err(_elapsed) => Err(SbdpError::TimedOut),
            Ok(Ok(Some(msg))) => {
                debug!(entries = msg.len(), "received message");
                Ok(msg)
            }
            Ok(Ok(None)) => Err(SbdpError::ConnectionClosed),
            Ok(Err(e)) => Err(map_stream_err(e)),
        }
    }

    /// True once a connection is established and not yet closed.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, SocketState::Connected(_))
    }

    /// Local address, once the socket is bound, listening, or connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            SocketState::Created(sock) | SocketState::Bound(sock) => sock.local_addr().ok(),
            SocketState::Listening(listener) => listener.local_addr().ok(),
            SocketState::Connected(framed) => framed.get_ref().local_addr().ok(),
            SocketState::Unopened | SocketState::Closed => None,
        }
    }

    /// Peer address of an established connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            SocketState::Connected(framed) => framed.get_ref().peer_addr().ok(),
            _ => None,
        }
    }
}

/// Resolves `host` to an IPv4 peer address, the address family the socket is
/// created with.
async fn resolve_v4(host: &str, port: u16) -> Option<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(SocketAddr::new(ip, port));
    }
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => addrs.find(|addr| addr.is_ipv4()),
        Err(e) => {
            debug!(host, error = %e, "name resolution failed");
            None
        }
    }
}

/// Collapses transport-level stream errors into the closed-connection shape
/// callers can act on; codec errors pass through untouched.
fn map_stream_err(e: SbdpError) -> SbdpError {
    match e {
        SbdpError::Io(io) => match io.kind() {
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => SbdpError::ConnectionClosed,
            _ => SbdpError::Io(io),
        },
        other => other,
    }
}
