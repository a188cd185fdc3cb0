//! Telegram relay: answers chat messages with a remote language model and
//! falls back to a scripted persona when the model is unavailable.

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod polling;
pub mod relay;
pub mod webhook;
