//! Hostname extraction for navigation URLs
//!
//! These functions avoid a full URL parse and work directly on string
//! slices. Only hierarchical URLs (`scheme://host...`) have a hostname;
//! `about:`, `data:` and similar URLs yield `None`.

// =============================================================================
// Scheme
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    let colon_pos = bytes.iter().position(|&b| b == b':')?;
    if colon_pos == 0 || !bytes[..colon_pos].iter().all(|&b| is_scheme_char(b)) {
        return None;
    }

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

#[inline]
fn is_scheme_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.'
}

// =============================================================================
// Host Position
// =============================================================================

/// Get the start and end positions of the hostname in a URL.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Authority ends at the first of '/', '?', '#'
    let mut authority_end = bytes.len();
    for (i, &b) in bytes[scheme_end..].iter().enumerate() {
        if b == b'/' || b == b'?' || b == b'#' {
            authority_end = scheme_end + i;
            break;
        }
    }

    // Skip userinfo
    let host_start = match bytes[scheme_end..authority_end].iter().rposition(|&b| b == b'@') {
        Some(at) => scheme_end + at + 1,
        None => scheme_end,
    };

    // Bracketed IPv6 literal keeps its colons
    if bytes.get(host_start) == Some(&b'[') {
        let close = bytes[host_start..authority_end].iter().position(|&b| b == b']')?;
        return Some((host_start, host_start + close + 1));
    }

    let host_end = bytes[host_start..authority_end]
        .iter()
        .position(|&b| b == b':')
        .map_or(authority_end, |i| host_start + i);

    Some((host_start, host_end))
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Host slice of `url`, without port or userinfo. No allocation.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

/// Canonical form of a hostname: lowercased, trailing dot removed.
/// Navigation URLs and scan reports must agree on it.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase()
}

/// Normalized hostname of `url`. Returns `None` when the URL carries no host.
pub fn hostname(url: &str) -> Option<String> {
    let host = normalize_host(extract_host(url.trim())?);
    (!host.is_empty()).then_some(host)
}
