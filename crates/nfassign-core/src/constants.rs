//! Assignment constants.

/// Maximum distance between the sum of all action shares and 1.0.
pub const SHARE_EPSILON: f64 = 1e-6;
