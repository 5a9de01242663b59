#[path = "../common/mod.rs"]
mod common;

mod limit_tests;
