use crate::{
    connection::{Connection, Endpoint, Timeouts},
    error::{ExchangeError, ExchangeResult},
    receive::UntilMarker,
    util::encode_single_byte,
};
use async_trait::async_trait;
use log::{error, info};
use std::{fmt::Debug, net::SocketAddr, sync::Arc};
use tokio::net::{self, TcpListener, TcpSocket};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 11000;
pub const DEFAULT_BACKLOG: u32 = 100;
/// Literal that ends a message sent to the echo server
pub const END_OF_MESSAGE: &str = "<EOF>";

/// Business logic for an accepted connection. A single instance is shared by
/// every connection the listener accepts, so it needs to be both `Send` and
/// `Sync`.
#[async_trait]
pub trait ConnectionHandler: Debug + Send + Sync {
    /// Called once per accepted peer. The handler owns the connection from
    /// here on, and is responsible for closing it.
    async fn handle_connection(
        &self,
        connection: Connection,
    ) -> ExchangeResult<()>;
}

/// Reads until the end-of-message marker, echoes everything it read, then
/// hangs up
#[derive(Clone, Debug)]
pub struct EchoHandler {
    marker: String,
}

impl EchoHandler {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new(END_OF_MESSAGE)
    }
}

#[async_trait]
impl ConnectionHandler for EchoHandler {
    async fn handle_connection(
        &self,
        mut connection: Connection,
    ) -> ExchangeResult<()> {
        let content = connection
            .receive(UntilMarker::new(self.marker.as_str()))
            .await?;
        info!(
            "{} Read {} bytes from socket. Data: {}",
            connection.peer_addr(),
            content.chars().count(),
            content
        );

        connection.send(&encode_single_byte(&content)).await?;
        connection.disconnect();
        Ok(())
    }
}

/// A bound, listening socket
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    timeouts: Timeouts,
}

impl Listener {
    /// Resolve the endpoint, bind to it, and start listening with the given
    /// backlog. Any failure along the way is [ExchangeError::Listen].
    pub async fn bind(
        endpoint: &Endpoint,
        backlog: u32,
        timeouts: Timeouts,
    ) -> ExchangeResult<Self> {
        let listen_error = |source| ExchangeError::Listen {
            endpoint: endpoint.to_string(),
            source,
        };

        let addr = net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(listen_error)?
            .next()
            .ok_or_else(|| {
                listen_error(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "host resolved to no addresses",
                ))
            })?;
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(listen_error)?;
        #[cfg(unix)]
        socket.set_reuseaddr(true).map_err(listen_error)?;
        socket.bind(addr).map_err(listen_error)?;
        let listener = socket.listen(backlog).map_err(listen_error)?;

        info!("Listening on {}", addr);
        Ok(Self { listener, timeouts })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Wait for exactly one peer to connect
    pub async fn accept(&self) -> ExchangeResult<Connection> {
        let (stream, peer_addr) =
            self.listener.accept().await.map_err(ExchangeError::Accept)?;
        info!("{} Connected", peer_addr);
        Ok(Connection::new(stream, peer_addr, self.timeouts))
    }

    /// Accept connections forever, one at a time. Each accepted connection is
    /// handed off to its own task and the loop immediately goes back to
    /// accepting, without waiting for the handler. Only returns if accepting
    /// fails, and that error is terminal.
    pub async fn accept_loop(
        self,
        handler: Arc<dyn ConnectionHandler>,
    ) -> ExchangeResult<()> {
        loop {
            let connection = match self.accept().await {
                Ok(connection) => connection,
                Err(error) => {
                    error!("Accept loop terminated: {:?}", error);
                    return Err(error);
                }
            };
            let peer_addr = connection.peer_addr();

            // Clone the handler reference so we can pass it into the task
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                match handler.handle_connection(connection).await {
                    Ok(()) => {}
                    // Peer hung up early, which isn't our problem
                    Err(ExchangeError::SocketClose) => {
                        info!("{} Closed before message completed", peer_addr);
                    }
                    Err(error) => {
                        error!(
                            "{} Error handling connection: {:?}",
                            peer_addr, error
                        );
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::connect,
        receive::{UntilClose, UntilMarker},
    };
    use std::time::Duration;
    use tokio::task::JoinHandle;

    /// Echoes marker-terminated messages until the peer hangs up, without
    /// closing in between
    #[derive(Debug)]
    struct RepeatingEcho;

    #[async_trait]
    impl ConnectionHandler for RepeatingEcho {
        async fn handle_connection(
            &self,
            mut connection: Connection,
        ) -> ExchangeResult<()> {
            loop {
                let message = connection
                    .receive(UntilMarker::new(END_OF_MESSAGE))
                    .await?;
                connection.send(&encode_single_byte(&message)).await?;
            }
        }
    }

    async fn start(
        handler: Arc<dyn ConnectionHandler>,
    ) -> (Endpoint, JoinHandle<ExchangeResult<()>>) {
        let listener = Listener::bind(
            &Endpoint::new(DEFAULT_HOST, 0),
            DEFAULT_BACKLOG,
            Timeouts::default(),
        )
        .await
        .unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(listener.accept_loop(handler));
        (Endpoint::new(DEFAULT_HOST, port), task)
    }

    fn timeouts() -> Timeouts {
        Timeouts::uniform(Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_echo_exchange() {
        let (endpoint, server) = start(Arc::new(EchoHandler::default())).await;

        let mut connection = connect(&endpoint, timeouts()).await.unwrap();
        connection.send(b"This is a test<EOF>").await.unwrap();
        // Server closes after echoing, which is what ends our receive
        let response = connection.receive(UntilClose).await.unwrap();
        assert_eq!(response, "This is a test<EOF>");
        connection.disconnect();

        server.abort();
    }

    #[tokio::test]
    async fn test_echo_large_message() {
        let (endpoint, server) = start(Arc::new(EchoHandler::default())).await;

        let mut message: Vec<u8> =
            (0..5000).map(|i| b'a' + (i % 26) as u8).collect();
        message.extend_from_slice(END_OF_MESSAGE.as_bytes());
        let mut connection = connect(&endpoint, timeouts()).await.unwrap();
        connection.send(&message).await.unwrap();
        let response = connection.receive(UntilClose).await.unwrap();
        assert_eq!(response.as_bytes(), message.as_slice());

        server.abort();
    }

    #[tokio::test]
    async fn test_custom_marker() {
        let (endpoint, server) = start(Arc::new(EchoHandler::new("\n"))).await;

        let mut connection = connect(&endpoint, timeouts()).await.unwrap();
        connection.send(b"hello\n").await.unwrap();
        assert_eq!(connection.receive(UntilClose).await.unwrap(), "hello\n");

        server.abort();
    }

    #[tokio::test]
    async fn test_sequential_round_trips() {
        let (endpoint, server) = start(Arc::new(RepeatingEcho)).await;

        let mut connection = connect(&endpoint, timeouts()).await.unwrap();
        for message in ["first<EOF>", "second, longer<EOF>", "3<EOF>"] {
            connection.send(message.as_bytes()).await.unwrap();
            let response = connection
                .receive(UntilMarker::new(END_OF_MESSAGE))
                .await
                .unwrap();
            assert_eq!(response, message);
        }
        assert!(connection.disconnect());

        server.abort();
    }

    #[tokio::test]
    async fn test_concurrent_clients() {
        let (endpoint, server) = start(Arc::new(EchoHandler::default())).await;

        // Open both before either sends, so both are in flight at once
        let mut first = connect(&endpoint, timeouts()).await.unwrap();
        let mut second = connect(&endpoint, timeouts()).await.unwrap();
        second.send(b"second<EOF>").await.unwrap();
        first.send(b"first<EOF>").await.unwrap();
        let (first_response, second_response) =
            tokio::join!(first.receive(UntilClose), second.receive(UntilClose));
        assert_eq!(first_response.unwrap(), "first<EOF>");
        assert_eq!(second_response.unwrap(), "second<EOF>");

        server.abort();
    }

    #[tokio::test]
    async fn test_bind_in_use() {
        let taken = Listener::bind(
            &Endpoint::new(DEFAULT_HOST, 0),
            DEFAULT_BACKLOG,
            Timeouts::default(),
        )
        .await
        .unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = Listener::bind(
            &Endpoint::new(DEFAULT_HOST, port),
            DEFAULT_BACKLOG,
            Timeouts::default(),
        )
        .await;
        assert!(matches!(result, Err(ExchangeError::Listen { .. })));
    }
}
