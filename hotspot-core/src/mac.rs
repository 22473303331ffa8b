/// The canonical "unknown/unbound" hardware address.
///
/// Two sessions both showing the sentinel are neither matching nor
/// mismatching; comparisons against it carry no meaning.
pub const SENTINEL_MAC: &str = "00:00:00:00:00:00";

/// Canonicalizes a hardware address to uppercase `XX:XX:XX:XX:XX:XX`.
///
/// Accepts mixed case, `-` or `:` separators, or twelve bare hex digits.
/// Input that cannot be parsed into six hex octets degrades to
/// [`SENTINEL_MAC`] so callers can always compare two normalized values
/// without handling a parse error.
pub fn normalize_mac(raw: &str) -> String {
    let cleaned = raw.trim().to_ascii_uppercase().replace('-', ":");

    let octets: Vec<&str> = if cleaned.contains(':') {
        cleaned.split(':').collect()
    } else if cleaned.len() == 12 && cleaned.bytes().all(|b| b.is_ascii_hexdigit()) {
        return (0..6)
            .map(|i| &cleaned[i * 2..i * 2 + 2])
            .collect::<Vec<_>>()
            .join(":");
    } else {
        return SENTINEL_MAC.to_string();
    };

    let well_formed = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.bytes().all(|b| b.is_ascii_hexdigit()));

    if well_formed {
        octets.join(":")
    } else {
        SENTINEL_MAC.to_string()
    }
}

/// True when `mac` is the "address unknown" sentinel.
pub fn is_sentinel(mac: &str) -> bool {
    mac == SENTINEL_MAC
}
