pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod worker;

pub use client::WorkerClient;
pub use config::WorkerConfig;
pub use dispatcher::Dispatcher;
pub use error::WorkerError;
