//! Test helpers shared by the grid data crates: float assertions, synthetic
//! volumes and a tracing subscriber that writes to the test harness.
//!
//! Pull it in as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod generators;

pub use generators::*;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a tracing subscriber that writes to the test output.
///
/// The filter comes from `RUST_LOG` (default `warn`). Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Assert that two numbers differ by at most `tol`. Both sides are
/// compared as `f64`.
///
/// ```
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(0.1_f32 + 0.2_f32, 0.3, 1e-6);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $tol:expr) => {{
        let (a, e, tol) = ($actual as f64, $expected as f64, $tol as f64);
        if !((a - e).abs() <= tol) {
            panic!(
                "values not within tolerance: actual {:?}, expected {:?}, |diff| {:?} > {:?}",
                a,
                e,
                (a - e).abs(),
                tol
            );
        }
    }};
}

/// Axis-by-axis [`assert_approx_eq!`] for 3-D points.
///
/// ```
/// use test_utils::assert_point_approx_eq;
///
/// assert_point_approx_eq!([1.0001, 2.0, 3.0], [1.0, 2.0, 3.0], 0.001);
/// ```
#[macro_export]
macro_rules! assert_point_approx_eq {
    ($actual:expr, $expected:expr, $tol:expr) => {{
        let (actual, expected) = ($actual, $expected);
        for axis in 0..3 {
            $crate::assert_approx_eq!(actual[axis], expected[axis], $tol);
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_within_tolerance() {
        assert_approx_eq!(2.0004, 2.0, 0.001);
        assert_approx_eq!(-7.25_f32, -7.25_f64, 0.0);
    }

    #[test]
    #[should_panic(expected = "not within tolerance")]
    fn test_approx_outside_tolerance() {
        assert_approx_eq!(3.5, 3.0, 0.1);
    }

    #[test]
    #[should_panic(expected = "not within tolerance")]
    fn test_approx_nan_never_matches() {
        assert_approx_eq!(f64::NAN, 0.0, 1.0);
    }

    #[test]
    fn test_point_approx() {
        assert_point_approx_eq!([0.5, -1.0, 9.0001], [0.5, -1.0, 9.0], 0.001);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }
}
