//! Utility maths functions
//!
//! All angle wrapping in the workspace goes through this module so that every
//! consumer (controllers, modules and odometry) agrees on the conventions:
//!
//! - Headings are stored in the range [0, 2pi).
//! - Signed angular distances are the shortest path, in the range (-pi, pi].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Normalise an angle into the range [0, 2pi).
pub fn norm_angle<T>(value: T) -> T
where
    T: Float
{
    let tau_t = tau::<T>();
    let r = rem_euclid(value, tau_t);

    // rem_euclid can round up to exactly tau for tiny negative inputs
    if r >= tau_t {
        T::zero()
    }
    else {
        r
    }
}

/// Get the shortest signed distance from `from` to `to` in a domain which
/// wraps with the given `period`.
///
/// The result lies in (-period/2, period/2] and is the same regardless of
/// which operand is larger.
pub fn wrap_dist<T>(from: T, to: T, period: T) -> T
where
    T: Float
{
    let half = period / (T::one() + T::one());
    let d = rem_euclid(to - from, period);

    if d > half {
        d - period
    }
    else {
        d
    }
}

/// Limit the magnitude of the 2D vector `(x, y)` to `max`, preserving its
/// direction.
///
/// Returns the (possibly scaled) vector and whether the limit was applied.
pub fn limit_mag<T>(x: T, y: T, max: T) -> (T, T, bool)
where
    T: Float
{
    let mag = x.hypot(y);

    if mag > max && mag > T::zero() {
        let scale = max / mag;
        (x * scale, y * scale, true)
    }
    else {
        (x, y, false)
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
/// This result is not an element of the function's codomain, but it is the
/// closest floating point number in the real numbers and thus fulfills the
/// property `self == self.div_euclid(rhs) * rhs + self.rem_euclid(rhs)`
/// approximatively.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn tau<T: Float>() -> T {
    // The conversion from f64 is infallible for the float types.
    T::from(std::f64::consts::TAU).unwrap_or_else(T::nan)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const TAU: f64 = std::f64::consts::TAU;
    const PI: f64 = std::f64::consts::PI;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-12, "{} != {}", a, b);
    }

    #[test]
    fn test_wrap_dist_angles() {
        assert_close(wrap_dist(1f64, 2f64, TAU), 1f64);
        assert_close(wrap_dist(2f64, 1f64, TAU), -1f64);
        assert_close(wrap_dist(0f64, TAU, TAU), 0f64);
        assert_close(wrap_dist(TAU, 0f64, TAU), 0f64);
        assert_close(wrap_dist(1f64, TAU, TAU), -1f64);
        assert_close(wrap_dist(0f64, TAU - 1f64, TAU), -1f64);
        assert_close(wrap_dist(TAU - 1f64, 1f64, TAU), 2f64);
    }

    #[test]
    fn test_wrap_dist_symmetric() {
        // Folded into (-pi, pi] no matter which operand is larger
        assert_close(wrap_dist(TAU - 0.1, 0.1, TAU), 0.2);
        assert_close(wrap_dist(0.1, TAU - 0.1, TAU), -0.2);

        // Exactly half a period is reported as positive
        assert_close(wrap_dist(0.0, PI, TAU), PI);
        assert_close(wrap_dist(PI, 0.0, TAU), PI);

        // Non-angular periods
        assert_close(wrap_dist(9.0, 1.0, 10.0), 2.0);
    }

    #[test]
    fn test_norm_angle() {
        let samples = [
            0.0, 1.0, PI, TAU, -TAU, -0.5, 7.0 * PI, -7.5 * PI, 1e6, -1e-18
        ];

        for &h in samples.iter() {
            let n = norm_angle(h);
            assert!(n >= 0.0 && n < TAU, "norm_angle({}) = {}", h, n);
            assert_eq!(norm_angle(n), n);
        }

        assert_close(norm_angle(-PI / 2.0), 1.5 * PI);
        assert_close(norm_angle(TAU + 0.25), 0.25);
    }

    #[test]
    fn test_limit_mag() {
        let (x, y, limited) = limit_mag(3.0, 4.0, 2.5);
        assert!(limited);
        assert_close(x, 1.5);
        assert_close(y, 2.0);

        let (x, y, limited) = limit_mag(0.3, -0.4, 2.5);
        assert!(!limited);
        assert_eq!((x, y), (0.3, -0.4));

        let (x, y, limited) = limit_mag(0.0, 0.0, 0.0);
        assert!(!limited);
        assert_eq!((x, y), (0.0, 0.0));
    }
}
