pub mod process_info;

pub use process_info::*;
