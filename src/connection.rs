use crate::{
    error::{ExchangeError, ExchangeResult},
    receive::{receive_until, Completion},
    util::{socket_write, with_timeout},
};
use derive_more::Display;
use log::{info, warn};
use std::{
    net::{Shutdown, SocketAddr},
    time::Duration,
};
use tokio::net::TcpStream;

/// Host/port pair to connect to or listen on
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "{}:{}", "host", "port")]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// The blocking steps a caller can wait on. Used to label timeouts.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq)]
pub enum Operation {
    #[display(fmt = "connect")]
    Connect,
    #[display(fmt = "send")]
    Send,
    #[display(fmt = "receive")]
    Receive,
}

/// Optional deadline for each operation. `None` waits indefinitely, which is
/// also the default.
#[derive(Copy, Clone, Debug, Default)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub send: Option<Duration>,
    pub receive: Option<Duration>,
}

impl Timeouts {
    /// Same deadline for every operation
    pub fn uniform(timeout: Option<Duration>) -> Self {
        Self {
            connect: timeout,
            send: timeout,
            receive: timeout,
        }
    }
}

/// An open TCP connection to one peer. Owned by whoever created it, and closed
/// exactly once by [Connection::disconnect] (or by dropping it).
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    timeouts: Timeouts,
}

impl Connection {
    pub(crate) fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            stream,
            peer_addr,
            timeouts,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Send the whole buffer, returning how many bytes went out
    pub async fn send(&mut self, bytes: &[u8]) -> ExchangeResult<usize> {
        let peer_addr = self.peer_addr;
        let bytes_sent = with_timeout(
            Operation::Send,
            self.timeouts.send,
            socket_write(&mut self.stream, bytes),
        )
        .await?;
        info!("{} Sent {} bytes", peer_addr, bytes_sent);
        Ok(bytes_sent)
    }

    /// Run one receive cycle, ending when `completion` says so
    pub async fn receive(
        &mut self,
        completion: impl Completion,
    ) -> ExchangeResult<String> {
        with_timeout(
            Operation::Receive,
            self.timeouts.receive,
            receive_until(&mut self.stream, completion),
        )
        .await
    }

    /// Shut down both directions and release the socket. Failure (e.g. the
    /// socket is already dead) is logged and reported as `false`.
    pub fn disconnect(self) -> bool {
        let peer_addr = self.peer_addr;
        match self
            .stream
            .into_std()
            .and_then(|stream| stream.shutdown(Shutdown::Both))
        {
            Ok(()) => {
                info!("{} Disconnected", peer_addr);
                true
            }
            Err(error) => {
                warn!("{} Error disconnecting: {}", peer_addr, error);
                false
            }
        }
    }
}

/// Open a connection to a remote endpoint. Resolution failure, refusal, and
/// unreachable hosts all come back as [ExchangeError::Connect].
pub async fn connect(
    endpoint: &Endpoint,
    timeouts: Timeouts,
) -> ExchangeResult<Connection> {
    let stream = with_timeout(Operation::Connect, timeouts.connect, async {
        TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|source| ExchangeError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })
    })
    .await?;
    let peer_addr =
        stream
            .peer_addr()
            .map_err(|source| ExchangeError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
    info!("Socket connected to {}", peer_addr);
    Ok(Connection::new(stream, peer_addr, timeouts))
}
