//! CLI command implementations
//!
//! Every command that processes data goes through a [`session::Session`]:
//! one link, the processor for its protocol, and one attached detector per
//! component.

#[cfg(feature = "serial")]
pub mod acquire;
pub mod config;
mod models;
pub mod replay;
mod session;

pub use models::list_models;
