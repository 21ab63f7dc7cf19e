//! Hosted engagement sessions.

pub mod manager;
pub mod ports;

pub use manager::{SessionHandle, SessionRuntime};
