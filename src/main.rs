use echo_exchange::{
    client::{BlockingClient, EchoClient, DEFAULT_MESSAGE},
    connection::{Endpoint, Timeouts},
    server::{
        EchoHandler, Listener, DEFAULT_BACKLOG, DEFAULT_HOST, DEFAULT_PORT,
        END_OF_MESSAGE,
    },
    util::encode_single_byte,
};
use clap::{Parser, Subcommand};
use env_logger::{Env, Target};
use std::{sync::Arc, time::Duration};
use tokio::runtime;

/// TCP echo exchange: a marker-delimited echo server and a client for it
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Echo back every message that ends with the marker
    Serve {
        /// IP/hostname to bind to
        #[clap(long, value_parser, default_value = DEFAULT_HOST)]
        host: String,

        /// Port number to host on
        #[clap(short, long, value_parser, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Maximum number of pending connections
        #[clap(long, value_parser, default_value_t = DEFAULT_BACKLOG)]
        backlog: u32,

        /// Literal that ends each incoming message
        #[clap(long, value_parser, default_value = END_OF_MESSAGE)]
        marker: String,

        /// Give up on a silent client after this many milliseconds
        #[clap(long, value_parser)]
        timeout_ms: Option<u64>,
    },
    /// Send one message and print the response
    Send {
        /// Message to send, verbatim
        #[clap(value_parser, default_value = DEFAULT_MESSAGE)]
        message: String,

        /// IP/hostname of the server
        #[clap(long, value_parser, default_value = DEFAULT_HOST)]
        host: String,

        /// Port number of the server
        #[clap(short, long, value_parser, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Give up on each step after this many milliseconds
        #[clap(long, value_parser)]
        timeout_ms: Option<u64>,
    },
}

fn timeouts(timeout_ms: Option<u64>) -> Timeouts {
    Timeouts::uniform(timeout_ms.map(Duration::from_millis))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .init();
    let args = Args::parse();

    match args.command {
        Command::Serve {
            host,
            port,
            backlog,
            marker,
            timeout_ms,
        } => {
            let runtime = runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let listener = Listener::bind(
                    &Endpoint::new(host, port),
                    backlog,
                    timeouts(timeout_ms),
                )
                .await?;
                listener.accept_loop(Arc::new(EchoHandler::new(marker))).await
            })?;
        }
        Command::Send {
            message,
            host,
            port,
            timeout_ms,
        } => {
            let client = BlockingClient::new(EchoClient::new(
                Endpoint::new(host, port),
                timeouts(timeout_ms),
            ))?;
            let response =
                client.send_message(&encode_single_byte(&message))?;
            println!("{}", response);
        }
    }

    Ok(())
}
