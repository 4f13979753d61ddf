//! Raw relevance scores to the open unit interval.

/// Divisor applied before the logistic function. Typical BM25 scores of a
/// few units land in the steep part of the curve.
pub const SCORE_SCALE: f64 = 8.0;

/// Largest f64 below 1.0. The logistic rounds to exactly 1.0 for raw scores
/// above roughly 294.
const BELOW_ONE: f64 = 1.0 - f64::EPSILON / 2.0;

/// Logistic squash of `raw / SCORE_SCALE` when `scale` is set, identity otherwise.
///
/// Scaled results always lie in the open interval (0, 1).
pub fn normalize(raw: f64, scale: bool) -> f64 {
    if !scale { return raw; }
    (1.0 / (1.0 + (-raw / SCORE_SCALE).exp())).clamp(f64::MIN_POSITIVE, BELOW_ONE)
}
