//! Tracking and compliance injection for outgoing messages
//!
//! Generates only: the open, click and unsubscribe endpoints live elsewhere
//! and authenticate hits with the tokens from `courier_common::crypto`.

pub mod config;
pub mod injector;

use thiserror::Error;

pub use config::TrackingConfig;
pub use injector::{InjectedMessage, InjectionContext, TrackingInjector};

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Could not rewrite message body: {0}")]
    Rewrite(String),
}
