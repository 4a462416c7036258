pub mod database;
pub mod store;

pub use store::{DEFAULT_USER, MessageStore, Watermark};
