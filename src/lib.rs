pub mod common;
pub mod config;
pub mod server;
pub mod storage;
