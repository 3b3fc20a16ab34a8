//! The accumulate-until-complete receive loop shared by client and server

use crate::{
    error::{ExchangeError, ExchangeResult},
    util::{decode_single_byte, socket_read},
};
use tokio::io::AsyncReadExt;

/// Size of the fixed buffer each read lands in
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Decides when an accumulated message is complete. Checked after every
/// chunk that gets appended.
pub trait Completion: Send {
    /// `appended_at` is the byte offset in `accumulated` where the newest
    /// chunk starts. Everything before it has already been checked.
    fn is_complete(&mut self, accumulated: &str, appended_at: usize) -> bool;

    /// Whether the peer closing its side ends the message. If not, a close
    /// before completion is an error.
    fn complete_on_close(&self) -> bool {
        false
    }
}

/// Message ends when the peer stops sending, i.e. a read returns zero bytes
#[derive(Copy, Clone, Debug, Default)]
pub struct UntilClose;

impl Completion for UntilClose {
    fn is_complete(&mut self, _: &str, _: usize) -> bool {
        false
    }

    fn complete_on_close(&self) -> bool {
        true
    }
}

/// Message ends at the first occurrence of a literal marker
#[derive(Clone, Debug)]
pub struct UntilMarker {
    marker: String,
}

impl UntilMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Completion for UntilMarker {
    fn is_complete(&mut self, accumulated: &str, appended_at: usize) -> bool {
        let marker = self.marker.as_bytes();
        if marker.is_empty() {
            return true;
        }

        // Only new bytes need scanning, plus enough of the old tail to catch
        // a marker that straddles two reads. Comparing bytes instead of
        // slicing the str means `start` doesn't need to be a char boundary.
        let start = appended_at.saturating_sub(marker.len() - 1);
        accumulated.as_bytes()[start..]
            .windows(marker.len())
            .any(|window| window == marker)
    }
}

/// Adapter for an arbitrary check over the whole accumulated text
#[derive(Clone, Debug)]
pub struct Predicate<F>(pub F);

impl<F> Completion for Predicate<F>
where
    F: FnMut(&str) -> bool + Send,
{
    fn is_complete(&mut self, accumulated: &str, _: usize) -> bool {
        (self.0)(accumulated)
    }
}

/// Read from the socket until `completion` says the message is done, and
/// return everything that was read. The buffer and accumulator live only for
/// this call, so separate calls can never bleed into each other.
pub async fn receive_until(
    mut socket: impl AsyncReadExt + Unpin,
    mut completion: impl Completion,
) -> ExchangeResult<String> {
    let mut buffer = [0; RECEIVE_BUFFER_SIZE];
    let mut accumulated = String::new();

    loop {
        let received = match socket_read(&mut socket, &mut buffer).await {
            Ok(received) => received,
            Err(ExchangeError::SocketClose)
                if completion.complete_on_close() =>
            {
                return Ok(accumulated);
            }
            Err(error) => return Err(error),
        };

        let appended_at = accumulated.len();
        accumulated.extend(decode_single_byte(received));
        if completion.is_complete(&accumulated, appended_at) {
            return Ok(accumulated);
        }
    }
}
