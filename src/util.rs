/// Checks that a numerical value lies in the interval `[a,b]`, returning early
/// with [`ConfigError::OutOfInterval`](crate::error::ConfigError::OutOfInterval) if not
///
/// ### Example
/// ```ignore
/// let alpha = 2.0;
/// ensure_interval!(alpha, 0.0, 1.0);
/// ```
/// This returns `Err` with the message
/// "invalid value for \`alpha\`: 2 is not in the interval \[0, 1\]".
#[macro_export]
macro_rules! ensure_interval {
    ($var:expr, $a:expr, $b:expr) => {
        if !($var >= $a && $var <= $b) {
            return Err($crate::error::ConfigError::OutOfInterval {
                name: stringify!($var),
                value: $var as f64,
                min: $a as f64,
                max: $b as f64,
            });
        }
    };
}

/// Index of the largest value, keeping the first on ties
///
/// `NaN` entries never win. Returns `0` for an all-`NaN` or empty slice.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
