//! Cross-surface message payloads
//!
//! Messages are one-shot JSON objects `{ "event": <name>, ...fields }`
//! answered with a single acknowledgement string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::keys::BLOCKED_ON_PAGE_KEY;

// =============================================================================
// Acknowledgements
// =============================================================================

/// Reply sent for a message the background acted on.
pub const HANDLED_ACK: &str = "handled by background script";

/// Reply sent for an unrecognized or malformed message.
pub const UNKNOWN_REQUEST_ACK: &str = "unknown request";

/// Acknowledgement returned to a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Handled,
    UnknownRequest,
}

impl Ack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handled => HANDLED_ACK,
            Self::UnknownRequest => UNKNOWN_REQUEST_ACK,
        }
    }
}

// =============================================================================
// Scan Report
// =============================================================================

/// Result of one scan pass, sent by the content scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub num_blocked: u64,
    pub hostname: String,
}

impl ScanReport {
    /// Report for a pass that substituted `count` elements. Passes that
    /// substituted nothing are not reported.
    pub fn for_pass(count: usize, hostname: impl Into<String>) -> Option<Self> {
        (count > 0).then(|| Self {
            num_blocked: count as u64,
            hostname: hostname.into(),
        })
    }

    /// Wire payload including the event name.
    pub fn to_message(&self) -> Value {
        serde_json::json!({
            "event": BLOCKED_ON_PAGE_KEY,
            "numBlocked": self.num_blocked,
            "hostname": self.hostname,
        })
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Message received by the background surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Scan result from a content scanner.
    BlockedOnPage(ScanReport),
    /// Any other event name, or a known event with a malformed body.
    Unknown { event: Option<String> },
}

impl Request {
    pub fn from_value(value: &Value) -> Self {
        let event = value.get("event").and_then(Value::as_str);
        match event {
            Some(BLOCKED_ON_PAGE_KEY) => match ScanReport::deserialize(value) {
                Ok(report) => Self::BlockedOnPage(report),
                Err(e) => {
                    log::warn!("Malformed {} message: {}", BLOCKED_ON_PAGE_KEY, e);
                    Self::Unknown {
                        event: event.map(str::to_string),
                    }
                }
            },
            _ => Self::Unknown {
                event: event.map(str::to_string),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scan_report() {
        let msg = json!({"event": "blockedOnPage", "numBlocked": 4, "hostname": "example.com"});
        assert_eq!(
            Request::from_value(&msg),
            Request::BlockedOnPage(ScanReport {
                num_blocked: 4,
                hostname: "example.com".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_event() {
        let msg = json!({"event": "somethingElse"});
        let request = Request::from_value(&msg);
        assert_eq!(
            request,
            Request::Unknown {
                event: Some("somethingElse".to_string())
            }
        );
        assert!(matches!(Request::from_value(&json!("ping")), Request::Unknown { event: None }));
    }

    #[test]
    fn test_malformed_scan_report() {
        let msg = json!({"event": "blockedOnPage", "numBlocked": -1, "hostname": "a.com"});
        assert!(matches!(Request::from_value(&msg), Request::Unknown { .. }));
        let msg = json!({"event": "blockedOnPage", "numBlocked": 1});
        assert!(matches!(Request::from_value(&msg), Request::Unknown { .. }));
    }

    #[test]
    fn test_report_only_nonzero_passes() {
        assert_eq!(ScanReport::for_pass(0, "a.com"), None);
        let report = ScanReport::for_pass(3, "a.com").unwrap();
        assert_eq!(
            report.to_message(),
            json!({"event": "blockedOnPage", "numBlocked": 3, "hostname": "a.com"})
        );
        assert_eq!(Request::from_value(&report.to_message()), Request::BlockedOnPage(report));
    }

    #[test]
    fn test_ack_strings() {
        assert_eq!(Ack::Handled.as_str(), "handled by background script");
        assert_eq!(Ack::UnknownRequest.as_str(), "unknown request");
    }
}
