//! A minimal TCP echo exchange. The server reads until an end-of-message
//! marker and echoes what it read; the client sends a payload and reads until
//! the server hangs up. Both sides share one receive loop, parameterized by
//! when a message counts as complete.

pub mod client;
pub mod connection;
pub mod error;
pub mod receive;
pub mod server;
pub mod util;
