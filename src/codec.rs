//! Wire format for persisted bucket state.
//!
//! A bucket is stored as the JSON array `[excess, lastUpdateMs, forbidden]`
//! with the flag written as `0` or `1`.

use serde_json::Value;

use crate::error::{LimitError, LimitResult};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BucketState {
    pub excess: f64,
    pub last_update_ms: u64,
    pub forbidden: bool,
}

impl BucketState {
    pub fn new(excess: f64, last_update_ms: u64, forbidden: bool) -> Self {
        Self {
            excess,
            last_update_ms,
            forbidden,
        }
    }

    /// State of a key that has never been written.
    pub fn fresh() -> Self {
        Self::default()
    }
}

pub fn encode(state: &BucketState) -> Vec<u8> {
    let flag = if state.forbidden { 1 } else { 0 };
    // Non-finite floats would be written as null.
    let excess = if state.excess.is_finite() {
        state.excess.max(0.0)
    } else {
        0.0
    };
    serde_json::json!([excess, state.last_update_ms, flag])
        .to_string()
        .into_bytes()
}

/// Decode a stored record. Corrupt or truncated input degrades to the fresh
/// state so a bad record can never block traffic.
pub fn decode(bytes: &[u8]) -> BucketState {
    match try_decode(bytes) {
        Ok(state) => state,
        Err(err) => {
            tracing::debug!(error = %err, "treating undecodable bucket as fresh");
            BucketState::fresh()
        }
    }
}

pub fn try_decode(bytes: &[u8]) -> LimitResult<BucketState> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| LimitError::Decode(e.to_string()))?;

    let fields = value
        .as_array()
        .ok_or_else(|| LimitError::Decode("expected an array".to_string()))?;
    if fields.len() < 3 {
        return Err(LimitError::Decode(format!(
            "expected 3 fields, found {}",
            fields.len()
        )));
    }

    let excess = fields[0]
        .as_f64()
        .filter(|e| e.is_finite() && *e >= 0.0)
        .ok_or_else(|| LimitError::Decode("excess is not a non-negative number".to_string()))?;

    let last_update_ms = match &fields[1] {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => None,
    }
    .ok_or_else(|| LimitError::Decode("timestamp is not a non-negative number".to_string()))?;

    let forbidden = match &fields[2] {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => return Err(LimitError::Decode("forbidden flag is not 0|1".to_string())),
    };

    Ok(BucketState {
        excess,
        last_update_ms,
        forbidden,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let state = BucketState::new(1000.0, 1_700_000_000_123, true);
        let encoded = String::from_utf8(encode(&state)).unwrap();
        assert_eq!(encoded, "[1000.0,1700000000123,1]");
    }

    #[test]
    fn test_decode_encoded_state() {
        let state = BucketState::new(2500.5, 42, false);
        assert_eq!(decode(&encode(&state)), state);

        let forbidden = BucketState::new(7000.0, 1_700_000_000_000, true);
        assert_eq!(decode(&encode(&forbidden)), forbidden);
    }

    #[test]
    fn test_decode_integer_excess() {
        let state = decode(b"[3000,1000,0]");
        assert_eq!(state, BucketState::new(3000.0, 1000, false));
    }

    #[test]
    fn test_decode_boolean_flag() {
        assert!(decode(b"[0,1,true]").forbidden);
        assert!(!decode(b"[0,1,false]").forbidden);
    }

    #[test]
    fn test_decode_truncated_is_fresh() {
        assert_eq!(decode(b"[1000,5]"), BucketState::fresh());
        assert_eq!(decode(b"[]"), BucketState::fresh());
        assert_eq!(decode(b"[1000,5"), BucketState::fresh());
    }

    #[test]
    fn test_decode_garbage_is_fresh() {
        assert_eq!(decode(b""), BucketState::fresh());
        assert_eq!(decode(b"not json"), BucketState::fresh());
        assert_eq!(decode(b"{\"excess\":1}"), BucketState::fresh());
        assert_eq!(decode(b"[\"a\",\"b\",\"c\"]"), BucketState::fresh());
        assert_eq!(decode(b"[-5,1,0]"), BucketState::fresh());
    }

    #[test]
    fn test_try_decode_reports_error() {
        assert!(matches!(try_decode(b"[1]"), Err(LimitError::Decode(_))));
    }
}
