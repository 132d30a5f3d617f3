//! Leaky-bucket decision logic.
//!
//! All quantities are scaled by 1000: `rate` is credits drained per second,
//! `burst` is the tolerated backlog and every request adds [`REQUEST_COST`].

use serde::Serialize;

use crate::codec::BucketState;

/// Credit added by a single request.
pub const REQUEST_COST: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Admit,
    /// Instantaneous overflow; the caller may retry later.
    Busy,
    /// The key sits in a penalty window until its record expires.
    Forbidden,
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Verdict::Admit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Admit => "admit",
            Verdict::Busy => "busy",
            Verdict::Forbidden => "forbidden",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub excess: f64,
}

/// Drain `previous.excess` for the time since its last update. Clock skew
/// between callers can put `now_ms` behind the stored timestamp, so the
/// elapsed time is taken as an absolute distance.
pub fn decay(previous: &BucketState, now_ms: u64, rate: u64) -> f64 {
    let elapsed_ms = now_ms.abs_diff(previous.last_update_ms) as f64;
    let decayed = previous.excess - rate as f64 * elapsed_ms / 1000.0;
    decayed.max(0.0)
}

pub fn evaluate(previous: &BucketState, now_ms: u64, rate: u64, burst: u64) -> Evaluation {
    if previous.forbidden {
        return Evaluation {
            verdict: Verdict::Forbidden,
            excess: previous.excess,
        };
    }

    let excess = decay(previous, now_ms, rate) + REQUEST_COST;
    let verdict = if excess > burst as f64 {
        Verdict::Busy
    } else {
        Verdict::Admit
    };

    Evaluation { verdict, excess }
}
