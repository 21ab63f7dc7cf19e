//! Message framing for newline-delimited JSON.

use serde::Serialize;

use crate::types::{HostError, HostMessage, HostResult};

/// Parse a single line of text as a host message.
pub fn parse_message(line: &str) -> HostResult<HostMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(HostError::Protocol("Empty message".to_string()));
    }

    serde_json::from_str(trimmed).map_err(|e| HostError::Protocol(format!("{e}: {trimmed}")))
}

/// Serialize a value to a JSON line (with trailing newline).
pub fn frame_message<T: Serialize>(value: &T) -> HostResult<String> {
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostCommand;

    #[test]
    fn test_empty_line_is_protocol_error() {
        assert!(matches!(parse_message("   "), Err(HostError::Protocol(_))));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let msg = parse_message("  {\"type\":\"close\"}\r\n").unwrap();
        assert_eq!(msg, HostMessage::Command(HostCommand::Close));
    }

    #[test]
    fn test_frame_appends_newline() {
        let framed = frame_message(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(framed, "{\"a\":1}\n");
    }
}
