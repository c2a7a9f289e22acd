use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Used for every quantity the simulation accounts for (speeds, bin levels,
/// thresholds, durations) so results are deterministic across platforms.
pub type Fixed64 = I32F32;

/// Simulated time in seconds, fixed-point so equal-instant comparisons are
/// exact and scheduler ordering never depends on float rounding.
pub type SimTime = Fixed64;

/// Convert an f64 to Fixed64. Use only at configuration boundaries, never in
/// the tick loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display/logging, never in the tick loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}
