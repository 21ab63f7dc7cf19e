//! Transport layer between the host page and the session runtime.

pub mod framing;
pub mod stdio;

pub use stdio::StdioTransport;
