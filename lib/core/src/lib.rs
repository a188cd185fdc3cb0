//! Core types shared across the palaver workspace.
//!
//! This crate provides the platform identifier types and the `Result`
//! alias used by every other crate in the relay.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ChatId, ParseIdError, UserId};
