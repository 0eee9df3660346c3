//! Threshold range codes.
//!
//! A sorted threshold table `t` splits the number line into `t.len() + 1` half-open
//! buckets `[t[i-1], t[i])`, with `t[-1] = -inf` and `t[len] = +inf`. A value equal to a
//! threshold belongs to the upper bucket.
//!
//! A numeric predicate is first turned into a continuous interval `[lo, hi)` bounded by
//! the field domain, then into the code interval `[lo_code, hi_code)` of every bucket
//! touching it. The code interval is an exact representation only when both interval
//! endpoints sit on a threshold or on a domain boundary.

use crate::{Error, Result};
use serde::Serialize;

/// Offset used to turn inclusive bounds into half-open ones
pub const DELTA: f64 = 0.000_000_1;

/// Upper bound for fields without a natural maximum (QUAL, DP)
pub const UNBOUNDED: f64 = f64::MAX;

/// Code interval for a numeric predicate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeQuery {
    pub min_value: f64,
    pub max_value: f64,
    pub min_code_inclusive: u8,
    pub max_code_exclusive: u8,
    /// The codes select precisely the values matching the predicate
    pub exact: bool,
    /// Number of buckets of the threshold table
    pub num_codes: u8,
}

impl RangeQuery {
    pub fn contains_code(&self, code: u8) -> bool {
        self.min_code_inclusive <= code && code < self.max_code_exclusive
    }

    /// The interval selects every bucket
    pub fn is_full_domain(&self) -> bool {
        self.min_code_inclusive == 0 && self.max_code_exclusive == self.num_codes
    }

    /// The predicate holds for every value and needs no index constraint
    pub fn is_always_true(&self) -> bool {
        self.is_full_domain() && self.exact
    }
}

pub fn equals_to(a: f64, b: f64) -> bool {
    (a - b).abs() < DELTA / 10.0
}

pub fn less_than(a: f64, b: f64) -> bool {
    a < b && !equals_to(a, b)
}

/// Continuous interval `[lo, hi)` for `value <op> x`, clamped to `[min, max)`
pub fn query_range(op: &str, value: f64, min: f64, max: f64) -> Result<(f64, f64)> {
    let range = match op {
        "" | "=" | "==" => (value, value + DELTA),
        "<" | "<<" => (min, value),
        "<=" | "<<=" => (min, value + DELTA),
        ">" | ">>" => (value + DELTA, max),
        ">=" | ">>=" => (value, max),
        other => {
            return Err(Error::InvalidQuery(format!(
                "unsupported range operator '{}'",
                other
            )));
        }
    };
    Ok((range.0.max(min), range.1.min(max)))
}

/// Bucket holding `value`: the number of thresholds lower or equal to it
pub fn range_code(value: f64, thresholds: &[f64]) -> u8 {
    thresholds
        .iter()
        .position(|t| less_than(value, *t))
        .unwrap_or(thresholds.len()) as u8
}

/// Exclusive upper code for the interval ending (exclusively) at `value`
pub fn range_code_exclusive(value: f64, thresholds: &[f64]) -> u8 {
    1 + range_code(value - DELTA, thresholds)
}

/// Encode `x <op> value` over `thresholds` within the domain `[min, max)`
pub fn encode_range(
    op: &str,
    value: f64,
    thresholds: &[f64],
    min: f64,
    max: f64,
) -> Result<RangeQuery> {
    let (lo, hi) = query_range(op, value, min, max)?;
    let num_codes = (thresholds.len() + 1) as u8;
    let lo_code = range_code(lo, thresholds);
    let hi_code = range_code_exclusive(hi, thresholds).max(lo_code + 1);

    let lo_on_boundary = if lo_code == 0 {
        equals_to(lo, min)
    } else {
        equals_to(lo, thresholds[(lo_code - 1) as usize])
    };
    let hi_on_boundary = if hi_code == num_codes {
        equals_to(hi, max)
    } else {
        equals_to(hi, thresholds[(hi_code - 1) as usize])
    };

    Ok(RangeQuery {
        min_value: lo,
        max_value: hi,
        min_code_inclusive: lo_code,
        max_code_exclusive: hi_code,
        exact: lo_on_boundary && hi_on_boundary,
        num_codes,
    })
}
