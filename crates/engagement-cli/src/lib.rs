//! Engagement host: drives a lead-capture session for a host page over JSON lines.

pub mod config;
pub mod repl;
pub mod session;
pub mod transport;
pub mod types;

pub use config::{load_config, resolve_config_path, resolve_state_path};
pub use session::{SessionHandle, SessionRuntime};
pub use transport::StdioTransport;
