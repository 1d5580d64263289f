pub mod archive;
pub mod completion;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod rates;
pub mod reveal;
pub mod service;
pub mod session;
pub mod stats;
pub mod transport;

pub use crate::config::Config;
pub use crate::error::{IntervaiewError, Result};
pub use crate::service::ChatService;
