//! Currency quantization.
//!
//! All amounts leave the estimator as whole cents. We compute with `f64` and
//! quantize at the end with `(x * 100).round() / 100`, so every public amount
//! is the nearest double to `k / 100` for some integer `k`.

/// Round half away from zero to the nearest cent.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Smallest whole-cent amount `>= value`.
pub fn ceil_cents(value: f64) -> f64 {
    (value * 100.0).ceil() / 100.0
}

/// Largest whole-cent amount `<= value`.
pub fn floor_cents(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}

/// True when `value` is already quantized to cents.
pub fn is_cents(value: f64) -> bool {
    round_cents(value) == value
}
