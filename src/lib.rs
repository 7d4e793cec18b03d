// src/lib.rs - Library root for the pen plotter host
pub mod config;
pub mod errors;
pub mod executor;
pub mod poll;
pub mod protocol;
pub mod recovery;
pub mod sim;
pub mod transport;

pub use config::{ConfigError, PlotterConfig};
pub use errors::{ErrorCode, ErrorReport, PlotterError};
pub use executor::{Instruction, PlotExecutor, RunOptions};
pub use protocol::GrblPlotter;
pub use transport::Connection;
