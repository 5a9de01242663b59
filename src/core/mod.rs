pub mod document;
pub mod suite;
pub mod worker_count;

pub use document::*;
pub use suite::*;
pub use worker_count::*;
