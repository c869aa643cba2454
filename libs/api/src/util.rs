use serde_json::Value;

/// Largest integer a JSON double represents exactly (2^53).
pub const MAX_EXACT_FLOAT_INT: u64 = 1 << 53;

/// Decode a stored counter or offset into `u64`.
///
/// Stores may hand numbers back as integers or as doubles (`5` vs `5.0`).
/// Both are accepted when they denote the same non-negative integer;
/// fractions, negatives, non-finite or imprecise doubles and non-numbers
/// are rejected instead of being truncated.
pub fn decode_offset(value: &Value) -> Result<u64, String> {
    let Value::Number(n) = value else {
        return Err(format!("expected a non-negative integer, got {value}"));
    };
    if let Some(v) = n.as_u64() {
        return Ok(v);
    }
    if n.is_i64() {
        return Err(format!("expected a non-negative integer, got {n}"));
    }
    match n.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= MAX_EXACT_FLOAT_INT as f64 => {
            Ok(f as u64)
        }
        _ => Err(format!("expected a non-negative integer, got {n}")),
    }
}
