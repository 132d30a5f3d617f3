use regex::Regex;
use std::sync::LazyLock;

static RATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<value>.+)r/(?P<unit>[sm])$").expect("valid rate pattern"));

/// Rate parameters of one invocation, in units scaled by 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    /// Credits drained per second.
    pub rate: u64,
    pub burst: u64,
    pub interval_secs: u64,
}

impl RateSpec {
    pub fn new(rate: &str, burst: f64, interval_secs: u64) -> Self {
        Self {
            rate: parse_rate(rate),
            burst: scale_burst(burst),
            interval_secs,
        }
    }

    pub fn forbids_on_exceed(&self) -> bool {
        self.interval_secs > 0
    }
}

/// Parse strings like `10r/s` or `30r/m`. Anything else is read as a plain
/// per-second number, and an unreadable number counts as 1.
pub fn parse_rate(rate: &str) -> u64 {
    let rate = rate.trim();
    let (value, scale) = match RATE_PATTERN.captures(rate) {
        Some(caps) => {
            let scale = if &caps["unit"] == "m" { 60.0 } else { 1.0 };
            (caps.name("value").map_or("", |m| m.as_str()), scale)
        }
        None => (rate, 1.0),
    };

    let value = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(1.0);

    (value * 1000.0 / scale).floor() as u64
}

pub fn scale_burst(burst: f64) -> u64 {
    if burst.is_finite() && burst > 0.0 {
        (burst * 1000.0).floor() as u64
    } else {
        0
    }
}
