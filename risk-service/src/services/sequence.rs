//! Human-readable sequential identifiers: `REQ-001`, `INC-2024-001`.
//!
//! Numbers are handed out by an atomic per-scope counter in the store. The
//! helpers here only format identifiers and derive the counter's starting
//! point from identifiers that already exist.

pub const REQUEST_SCOPE: &str = "REQ";

/// Counter scope for records created in `year`.
pub fn record_scope(prefix: &str, year: i32) -> String {
    format!("{}-{}", prefix, year)
}

/// Zero-padded to three digits; wider numbers are kept whole.
pub fn format_id(scope: &str, n: i64) -> String {
    format!("{}-{:03}", scope, n)
}

/// Trailing number of `id` if it belongs to `scope`.
pub fn parse_suffix(id: &str, scope: &str) -> Option<i64> {
    let digits = id.strip_prefix(scope)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Highest number already used in `scope`, or 0.
pub fn highest_used<'a, I>(ids: I, scope: &str) -> i64
where
    I: IntoIterator<Item = &'a str>,
{
    ids.into_iter()
        .filter_map(|id| parse_suffix(id, scope))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_three_digit_padding() {
        assert_eq!(format_id(REQUEST_SCOPE, 1), "REQ-001");
        assert_eq!(format_id("INC-2024", 42), "INC-2024-042");
        assert_eq!(format_id(REQUEST_SCOPE, 1000), "REQ-1000");
    }

    #[test]
    fn parses_suffix_only_within_scope() {
        assert_eq!(parse_suffix("REQ-007", REQUEST_SCOPE), Some(7));
        assert_eq!(parse_suffix("INC-2024-015", "INC-2024"), Some(15));
        assert_eq!(parse_suffix("INC-2023-015", "INC-2024"), None);
        assert_eq!(parse_suffix("REQ-abc", REQUEST_SCOPE), None);
        assert_eq!(parse_suffix("REQ-", REQUEST_SCOPE), None);
        assert_eq!(parse_suffix("REQ-+5", REQUEST_SCOPE), None);
    }

    #[test]
    fn highest_used_ignores_other_scopes_and_garbage() {
        let ids = ["INC-2024-002", "INC-2023-900", "INC-2024-x", "INC-2024-010"];
        assert_eq!(highest_used(ids, "INC-2024"), 10);
        assert_eq!(highest_used(Vec::<&str>::new(), "INC-2024"), 0);
    }

    #[test]
    fn numeric_order_survives_width_change() {
        assert_eq!(highest_used(["REQ-999", "REQ-1000"], REQUEST_SCOPE), 1000);
    }
}
