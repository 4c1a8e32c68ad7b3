pub mod attachment;
pub mod cli;
pub mod config;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod reporter;
pub mod sink;
pub mod supervisor;
pub mod transport;

pub use zenoh::Result;

pub use error::Error;
pub use supervisor::{ShutdownSummary, Supervisor};

pub trait Builder {
    type Output;
    fn build(self) -> Result<Self::Output>;
}
