#![allow(clippy::uninlined_format_args)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod metrics;
pub mod network;
pub mod utils;

pub use config::*;
pub use core::*;
pub use error::{ProbeError, Result};
pub use metrics::*;
pub use network::*;
pub use utils::*;
