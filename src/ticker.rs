use std::time::Duration;

/// Default presentation tick in milliseconds. The live elapsed readout is a
/// derived value recomputed on each tick; it is never written back to the
/// store.
pub const DEFAULT_TICK_MS: u64 = 1000;

/// Get tick duration
pub fn tick_duration() -> Duration {
    Duration::from_millis(DEFAULT_TICK_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_duration() {
        let duration = tick_duration();
        assert_eq!(duration, Duration::from_millis(1000));
    }
}
