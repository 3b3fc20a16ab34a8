use crate::{
    connection::{connect, Endpoint, Timeouts},
    error::ExchangeResult,
    receive::UntilClose,
};
use anyhow::{anyhow, Context};
use std::sync::Arc;
use tokio::{
    runtime::{self, Runtime},
    sync::oneshot,
};

/// Message the send button fires when nothing else is given
pub const DEFAULT_MESSAGE: &str = "This is a test<EOF>";

/// Sends a payload to a fixed endpoint and waits for the whole response. The
/// response is complete once the server hangs up.
#[derive(Clone, Debug)]
pub struct EchoClient {
    endpoint: Endpoint,
    timeouts: Timeouts,
}

impl EchoClient {
    pub fn new(endpoint: Endpoint, timeouts: Timeouts) -> Self {
        Self { endpoint, timeouts }
    }

    /// One full exchange: connect, send, read until the server closes, then
    /// disconnect. Each call gets its own connection and receive buffer.
    pub async fn send_message(
        &self,
        payload: &[u8],
    ) -> ExchangeResult<String> {
        let mut connection = connect(&self.endpoint, self.timeouts).await?;
        connection.send(payload).await?;
        let response = connection.receive(UntilClose).await?;
        connection.disconnect();
        Ok(response)
    }
}

/// Synchronous front for [EchoClient], for callers that aren't async (e.g. a
/// UI event handler). Each exchange runs as a task on an internal runtime,
/// and the caller blocks on a oneshot channel made just for that call. The
/// channel holds the result even if it's sent before the caller starts
/// waiting, so there's no lost wakeup, and no two calls ever share one.
///
/// Must not be used from within an async context, since blocking there would
/// stall the executor. Tokio panics if you try.
#[derive(Debug)]
pub struct BlockingClient {
    client: Arc<EchoClient>,
    runtime: Runtime,
}

impl BlockingClient {
    pub fn new(client: EchoClient) -> ExchangeResult<Self> {
        // Needs its own worker, since the calling thread is busy waiting
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("echo-exchange")
            .enable_all()
            .build()
            .context("Error building client runtime")?;
        Ok(Self {
            client: Arc::new(client),
            runtime,
        })
    }

    /// Run one exchange and block until it's done
    pub fn send_message(&self, payload: &[u8]) -> ExchangeResult<String> {
        let (sender, receiver) = oneshot::channel();
        let client = Arc::clone(&self.client);
        let payload = payload.to_vec();
        self.runtime.spawn(async move {
            let result = client.send_message(&payload).await;
            // Receiver only goes away if the caller did, so nobody to tell
            let _ = sender.send(result);
        });

        receiver
            .blocking_recv()
            .map_err(|_| anyhow!("Exchange task ended without a result"))?
    }
}
