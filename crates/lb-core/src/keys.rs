//! Store key layout shared by every surface.

use crate::types::TabId;

/// Global enabled flag (`bool`).
pub const BLOCKING_ENABLED_KEY: &str = "blockingEnabled";

/// Prefix of the per-tab counter keys. Also the `event` name of the
/// scan-result message.
pub const BLOCKED_ON_PAGE_KEY: &str = "blockedOnPage";

/// Store key holding the counter entry for `tab_id`.
pub fn blocked_page_key(tab_id: TabId) -> String {
    format!("{BLOCKED_ON_PAGE_KEY}:{tab_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_page_key() {
        assert_eq!(blocked_page_key(7), "blockedOnPage:7");
        assert_eq!(blocked_page_key(-1), "blockedOnPage:-1");
    }
}
