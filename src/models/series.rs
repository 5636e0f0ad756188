//! Reductions applied to a window of samples before it is shown to a user

/// Most recent non-null sample
pub fn latest(samples: &[Option<f64>]) -> Option<f64> {
    samples.iter().rev().find_map(|s| *s)
}

/// Sum of the window; `None` when no sample is present
pub fn total(samples: &[Option<f64>]) -> Option<f64> {
    samples
        .iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Average power (kW) over a sample carrying `energy_kwh`
pub fn average_power_kw(energy_kwh: f64, sample_secs: u32) -> Option<f64> {
    (sample_secs > 0).then(|| energy_kwh * 3600.0 / f64::from(sample_secs))
}

/// Power factor reported as a fraction, expressed in percent
pub fn power_factor_percent(fraction: f64) -> f64 {
    fraction * 100.0
}

/// Round to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_skips_trailing_nulls() {
        assert_eq!(latest(&[Some(1.0), Some(2.0), None]), Some(2.0));
        assert_eq!(latest(&[None, None]), None);
        assert_eq!(latest(&[]), None);
    }

    #[test]
    fn total_ignores_nulls() {
        assert_eq!(total(&[Some(0.5), None, Some(0.25)]), Some(0.75));
        assert_eq!(total(&[None]), None);
    }

    #[test]
    fn conversions() {
        assert_eq!(average_power_kw(1.0, 1800), Some(2.0));
        assert_eq!(average_power_kw(0.5, 3600), Some(0.5));
        assert_eq!(average_power_kw(1.0, 0), None);
        assert_eq!(round_to(power_factor_percent(0.987), 1), 98.7);
    }
}
