use crate::connection::Operation;
use std::{io, time::Duration};
use thiserror::Error;

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Error connecting to {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("Error listening on {endpoint}")]
    Listen {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// Terminal for the accept loop
    #[error("Error accepting connection")]
    Accept(#[source] io::Error),
    #[error("Error writing to socket")]
    Send(#[source] io::Error),
    #[error("Error reading from socket")]
    Receive(#[source] io::Error),

    /// Peer closed its side before the message was complete
    #[error("Socket closed")]
    SocketClose,

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
