/// Floating point type used throughout the engine.
pub type Real = f64;

/// Standard gravity, m/s².
pub const GRAVITY: Real = 9.80665;

/// Infinity norm of a slice (0 for an empty slice).
pub fn inf_norm(v: &[Real]) -> Real {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Relative infinity-norm change between two iterates, normalized by the
/// infinity norm of the new iterate (or 1 if that norm is zero).
pub fn rel_inf_change(new: &[Real], old: &[Real]) -> Real {
    debug_assert_eq!(new.len(), old.len());
    let mut diff = 0.0_f64;
    for (a, b) in new.iter().zip(old.iter()) {
        diff = diff.max((a - b).abs());
    }
    let scale = inf_norm(new);
    if scale == 0.0 { diff } else { diff / scale }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inf_norm_of_empty_slice_is_zero() {
        assert_eq!(inf_norm(&[]), 0.0);
        assert_eq!(inf_norm(&[-3.0, 2.0]), 3.0);
    }

    #[test]
    fn rel_change_normalizes_by_new_iterate() {
        let old = [1.0, 2.0];
        let new = [1.0, 4.0];
        assert!((rel_inf_change(&new, &old) - 0.5).abs() < 1e-15);
        // Zero new iterate falls back to the absolute change
        assert_eq!(rel_inf_change(&[0.0], &[3.0]), 3.0);
    }
}
