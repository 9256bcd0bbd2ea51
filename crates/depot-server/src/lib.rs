//! TCP server for depot.
//!
//! Each connection carries exactly one request. The accept loop hands every
//! connection to a [`ConnectionWorker`] running on a bounded [`WorkerPool`];
//! the worker reads the request, lets the [`ProtocolHandler`] apply it to the
//! repository store, writes the response parts and closes.

pub mod config;
pub mod error;
pub mod handler;
pub mod listener;
pub mod pool;
pub mod server;
pub mod worker;

pub use config::{CompatConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::ProtocolHandler;
pub use listener::Listener;
pub use pool::WorkerPool;
pub use server::DepotServer;
pub use worker::{ConnectionSettings, ConnectionWorker};
