use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST: AtomicI64 = AtomicI64::new(0);

/// Current GMT unix time in whole seconds.
///
/// Never lower than a value already returned in this process, so a wall-clock
/// step backwards cannot make a later write lose to an earlier one.
pub fn timestamp() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let prev = LAST.fetch_max(now, Ordering::SeqCst);
    prev.max(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_do_not_regress() {
        let a = timestamp();
        let b = timestamp();
        assert!(b >= a);
        assert!(a > 1_600_000_000);
    }
}
