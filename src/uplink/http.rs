//! # HTTP Gateway
//!
//! Plain HTTP/1.1 over TCP, one connection per request.
//!
//! The exchange is resolve, allocate socket, connect, write the whole request,
//! then read until the server closes the connection. Each failing step waits a
//! fixed delay before returning so a flapping link is not hammered; nothing is
//! retried here and there is no overall timeout.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{HttpResponse, RequestOutcome, UploadGateway};

/// Default HTTP port
pub const HTTP_PORT: u16 = 80;

/// Initial size of the response buffer; it grows as needed
const RECV_BUFFER_SIZE: usize = 512;

/// Connection setup failure, split by the step that failed
#[derive(Debug)]
pub enum ConnectError {
    /// Socket could not be allocated
    Socket(io::Error),
    /// Socket was allocated but the connection failed
    Connect(io::Error),
}

/// Opens byte streams to remote hosts
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Resolve `host` to a single socket address
    async fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr>;

    /// Allocate a socket and connect it to `addr`
    async fn connect(&self, addr: SocketAddr) -> Result<Self::Stream, ConnectError>;
}

/// Connector using the OS resolver and tokio TCP sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr> {
        lookup_host((host, port)).await?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", host))
        })
    }

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream, ConnectError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(ConnectError::Socket)?;

        socket.connect(addr).await.map_err(ConnectError::Connect)
    }
}

/// Delays applied before a failed request returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub resolution: Duration,
    pub socket: Duration,
    pub connect: Duration,
    pub send: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            resolution: Duration::from_millis(1000),
            socket: Duration::from_millis(1000),
            connect: Duration::from_millis(4000),
            send: Duration::from_millis(4000),
        }
    }
}

impl Backoff {
    /// No delays at all
    pub fn none() -> Self {
        Self {
            resolution: Duration::ZERO,
            socket: Duration::ZERO,
            connect: Duration::ZERO,
            send: Duration::ZERO,
        }
    }
}

/// Upload gateway speaking HTTP/1.1 over a [`Connector`]
#[derive(Debug, Clone)]
pub struct HttpGateway<C = TcpConnector> {
    connector: C,
    port: u16,
    backoff: Backoff,
}

impl HttpGateway<TcpConnector> {
    /// Gateway over plain TCP
    pub fn new(port: u16, backoff: Backoff) -> Self {
        Self::with_connector(TcpConnector, port, backoff)
    }
}

impl<C: Connector> HttpGateway<C> {
    /// Gateway over a custom connector
    pub fn with_connector(connector: C, port: u16, backoff: Backoff) -> Self {
        Self {
            connector,
            port,
            backoff,
        }
    }

    async fn fail(&self, outcome: RequestOutcome, delay: Duration) -> RequestOutcome {
        if !delay.is_zero() {
            debug!("Waiting {:?} before giving up", delay);
            sleep(delay).await;
        }
        outcome
    }
}

#[async_trait]
impl<C: Connector> UploadGateway for HttpGateway<C> {
    async fn send(&self, host: &str, request: &[u8]) -> RequestOutcome {
        let addr = match self.connector.resolve(host, self.port).await {
            Ok(addr) => addr,
            Err(e) => {
                error!("DNS lookup for {} failed: {}", host, e);
                return self
                    .fail(RequestOutcome::ResolutionFailed, self.backoff.resolution)
                    .await;
            }
        };
        debug!("DNS lookup succeeded, {} is {}", host, addr);

        let mut stream = match self.connector.connect(addr).await {
            Ok(stream) => stream,
            Err(ConnectError::Socket(e)) => {
                error!("Failed to allocate socket: {}", e);
                return self
                    .fail(RequestOutcome::SocketFailed, self.backoff.socket)
                    .await;
            }
            Err(ConnectError::Connect(e)) => {
                error!("Connecting to {} failed: {}", addr, e);
                return self
                    .fail(RequestOutcome::ConnectFailed, self.backoff.connect)
                    .await;
            }
        };
        debug!("Connected to {}", addr);

        let sent = match stream.write_all(request).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            error!("Sending request to {} failed: {}", host, e);
            return self
                .fail(RequestOutcome::SendFailed, self.backoff.send)
                .await;
        }
        debug!("Sent {} byte request to {}", request.len(), host);

        let mut buf = BytesMut::with_capacity(RECV_BUFFER_SIZE);
        loop {
            match stream.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(n) => debug!("Received {} bytes", n),
                Err(e) => {
                    warn!("Reading response from {} stopped: {}", host, e);
                    break;
                }
            }
        }

        let response = HttpResponse::parse(buf.freeze());
        info!(
            "Request to {} done, status {:?}, {} bytes received",
            host,
            response.status,
            response.raw.len()
        );
        RequestOutcome::Completed(response)
    }
}
