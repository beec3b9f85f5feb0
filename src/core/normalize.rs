//! Folding raw orientation readings into a tilt magnitude.

/// Largest tilt magnitude a normalized reading can have.
pub const MAX_TILT: f64 = 90.0;

/// Map a raw orientation angle onto a tilt magnitude in `[0, 90]`.
///
/// The sign is dropped and readings past vertical are reflected
/// (`180 - value`), so devices mounted either way up read the same. Inputs
/// beyond ±180° are wrapped into that range first. Non-finite input reads as
/// zero tilt.
pub fn normalize(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }

    let mut angle = raw.abs() % 360.0;
    if angle > 180.0 {
        angle = 360.0 - angle;
    }
    if angle > MAX_TILT {
        angle = 180.0 - angle;
    }
    angle.clamp(0.0, MAX_TILT)
}

/// Apply a calibration offset to a normalized angle.
pub fn correct(normalized: f64, offset: f64) -> f64 {
    (normalized - offset).abs()
}
