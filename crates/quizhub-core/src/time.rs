/// Wall-clock instant as Unix epoch milliseconds. This is the unit every
/// timestamp on the wire uses.
pub type Timestamp = i64;

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_millis() -> Timestamp {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(dur.as_millis()).unwrap_or(i64::MAX)
}

/// `base` shifted forward by `delay_ms`, saturating instead of overflowing.
pub fn add_millis(base: Timestamp, delay_ms: u64) -> Timestamp {
    base.saturating_add(i64::try_from(delay_ms).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn add_millis_saturates() {
        assert_eq!(add_millis(1_000, 500), 1_500);
        assert_eq!(add_millis(i64::MAX - 1, 10), i64::MAX);
        assert_eq!(add_millis(0, u64::MAX), i64::MAX);
    }
}
