/// Round `value` to `decimals` places, halves to even.
///
/// Used when widening single-precision file values so that
/// `f32 -> f64` noise (e.g. `12.300000190734863`) does not leak into
/// text formats.
#[inline]
pub fn round_half_even(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(decimals);
    let scaled = value * scale;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_precision_noise() {
        let widened = 12.3f32 as f64;
        assert_ne!(widened, 12.3);
        assert_eq!(round_half_even(widened, 5), 12.3);
    }

    #[test]
    fn halves_go_to_even() {
        assert_eq!(round_half_even(0.5, 0), 0.0);
        assert_eq!(round_half_even(1.5, 0), 2.0);
        assert_eq!(round_half_even(-2.5, 0), -2.0);
    }

    #[test]
    fn non_finite_passes_through() {
        assert!(round_half_even(f64::NAN, 5).is_nan());
        assert_eq!(round_half_even(f64::INFINITY, 5), f64::INFINITY);
    }
}
