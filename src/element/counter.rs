//! Numeric counters that wrap on overflow.

use alloc::string::String;

use crate::clock::TimeTicket;
use crate::element::primitive::Primitive;
use crate::error::{DocumentError, Result};

/// The counter's numeric width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CounterValue {
    /// 32-bit counter.
    Int32(i32),
    /// 64-bit counter.
    Int64(i64),
}

impl CounterValue {
    /// Widen to `i64` for display and delta arithmetic.
    pub fn as_i64(&self) -> i64 {
        match self {
            CounterValue::Int32(v) => *v as i64,
            CounterValue::Int64(v) => *v,
        }
    }
}

/// A CRDT counter. `increase` wraps on overflow (two's-complement, matching
/// `i32`/`i64` `wrapping_add`) and truncates a floating delta toward zero
/// before applying it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Counter {
    value: CounterValue,
    created_at: TimeTicket,
    moved_at: Option<TimeTicket>,
    removed_at: Option<TimeTicket>,
}

impl Counter {
    /// A new 32-bit counter.
    pub fn new_i32(value: i32, created_at: TimeTicket) -> Self {
        Self {
            value: CounterValue::Int32(value),
            created_at,
            moved_at: None,
            removed_at: None,
        }
    }

    /// A new 64-bit counter.
    pub fn new_i64(value: i64, created_at: TimeTicket) -> Self {
        Self {
            value: CounterValue::Int64(value),
            created_at,
            moved_at: None,
            removed_at: None,
        }
    }

    /// The current value.
    pub fn value(&self) -> CounterValue {
        self.value
    }

    /// When this counter was created.
    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    /// When this counter was tombstoned, if ever.
    pub fn removed_at(&self) -> Option<TimeTicket> {
        self.removed_at
    }

    /// Tombstone this counter at `at`, if `at` is newer than any existing
    /// `removed_at`. Returns `true` if the tombstone was (re)applied.
    pub fn set_removed_at(&mut self, at: TimeTicket) -> bool {
        if self.removed_at.map(|r| at > r).unwrap_or(true) {
            self.removed_at = Some(at);
            true
        } else {
            false
        }
    }

    /// Apply a delta, read from a [`Primitive`]. Integer deltas add
    /// directly; a float delta is truncated toward zero first. Addition
    /// wraps on overflow rather than panicking or saturating, so replicas
    /// that apply the same sequence of increases in different orders still
    /// converge (wrapping add is commutative and associative modulo the
    /// machine width).
    pub fn increase(&mut self, delta: &Primitive) -> Result<()> {
        let delta_i64 = match delta {
            Primitive::Int32(v) => *v as i64,
            Primitive::Int64(v) => *v,
            Primitive::Float64(v) => *v as i64, // truncates toward zero
            other => {
                return Err(DocumentError::TypeMismatch {
                    expected: "int32, int64, or float64",
                    actual: other.type_name(),
                })
            }
        };
        self.value = match self.value {
            CounterValue::Int32(v) => CounterValue::Int32(v.wrapping_add(delta_i64 as i32)),
            CounterValue::Int64(v) => CounterValue::Int64(v.wrapping_add(delta_i64)),
        };
        Ok(())
    }

    /// Render as JSON (a bare number, no type tag).
    pub fn to_json(&self) -> String {
        match self.value {
            CounterValue::Int32(v) => alloc::format!("{v}"),
            CounterValue::Int64(v) => alloc::format!("{v}"),
        }
    }

    /// Checks the tombstone-ordering invariant: a removed counter's
    /// `removed_at` must be strictly after its `created_at`.
    #[cfg(debug_assertions)]
    pub fn dbg_invariants(&self) -> bool {
        self.removed_at.map(|r| r > self.created_at).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ActorID;

    fn t(n: u64) -> TimeTicket {
        TimeTicket::new(n, 0, Some(ActorID::new([1; 12])))
    }

    #[test]
    fn i32_increase_wraps_on_overflow() {
        let mut c = Counter::new_i32(i32::MAX, t(1));
        c.increase(&Primitive::Int32(1)).unwrap();
        assert_eq!(c.value(), CounterValue::Int32(i32::MIN));
    }

    #[test]
    fn i64_increase_wraps_on_overflow() {
        let mut c = Counter::new_i64(i64::MAX, t(1));
        c.increase(&Primitive::Int32(1)).unwrap();
        assert_eq!(c.value(), CounterValue::Int64(i64::MIN));
    }

    #[test]
    fn float_delta_truncates_toward_zero() {
        let mut c = Counter::new_i32(10, t(1));
        c.increase(&Primitive::Float64(3.5)).unwrap();
        assert_eq!(c.value(), CounterValue::Int32(13));

        let mut c2 = Counter::new_i64(0, t(1));
        c2.increase(&Primitive::Float64(-1.5)).unwrap();
        assert_eq!(c2.value(), CounterValue::Int64(-1));
    }

    #[test]
    fn increase_rejects_non_numeric_delta() {
        let mut c = Counter::new_i32(0, t(1));
        let err = c.increase(&Primitive::Str(alloc::string::String::from("x"))).unwrap_err();
        assert!(matches!(err, DocumentError::TypeMismatch { .. }));
    }
}
