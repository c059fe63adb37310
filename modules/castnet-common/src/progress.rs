/// Percentage of target reached, clamped to 0-100. A non-positive target is
/// defined as 0% to avoid division by zero.
pub fn progress_pct(processed: i64, target: i64) -> i16 {
    if target <= 0 {
        return 0;
    }
    let pct = (processed as f64 / target as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_target_is_zero_progress() {
        assert_eq!(progress_pct(0, 0), 0);
        assert_eq!(progress_pct(500, 0), 0);
        assert_eq!(progress_pct(10, -5), 0);
    }

    #[test]
    fn clamps_to_bounds() {
        assert_eq!(progress_pct(-3, 10), 0);
        assert_eq!(progress_pct(25, 10), 100);
    }

    #[test]
    fn rounds_to_nearest() {
        assert_eq!(progress_pct(6, 10), 60);
        assert_eq!(progress_pct(1, 3), 33);
        assert_eq!(progress_pct(2, 3), 67);
    }

    #[test]
    fn always_within_bounds() {
        for processed in [-10i64, 0, 1, 5, 99, 1000] {
            for target in [-1i64, 0, 1, 7, 100] {
                let p = progress_pct(processed, target);
                assert!((0..=100).contains(&p), "progress({processed},{target}) = {p}");
            }
        }
    }
}
