//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Offset added to the reference value in `rel_diff` so that a zero reference
/// does not cause a division by zero.
pub const REL_DIFF_OFFSET: f64 = 0.01;

/// Clamp a value into `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Relative difference of `a` with respect to the reference `b`.
///
/// Computed as `|(a - b) / |b + 0.01||`.
pub fn rel_diff<T>(a: T, b: T) -> T
where
    T: Float
{
    let offset = T::from(REL_DIFF_OFFSET).unwrap_or_else(T::zero);

    ((a - b) / (b + offset).abs()).abs()
}

/// Return the largest absolute elementwise difference between two slices.
///
/// If the slices do not have the same length then `None` is returned.
pub fn max_abs_diff<T>(a: &[T], b: &[T]) -> Option<T>
where
    T: Float
{
    if a.len() != b.len() {
        return None;
    }

    Some(a.iter()
        .zip(b.iter())
        .fold(T::zero(), |m, (x, y)| m.max((*x - *y).abs())))
}
