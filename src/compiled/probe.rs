//! Probe values
//!
//! Synthetic values handed to a query template during planning so that no
//! two parameter members hold the same value. Numbers, text, timestamps and
//! floats share one counter, so a probe is distinct from every other probe
//! of any type.

use crate::value::QueryEnum;
use chrono::{DateTime, Duration, Utc};
use std::any::TypeId;
use std::collections::HashMap;
use uuid::Uuid;

/// First value handed out; kept clear of small enum ordinals
const PROBE_SEED: i64 = 1000;

#[derive(Debug)]
pub struct ProbeValues {
    next: i64,
    enum_cursors: HashMap<TypeId, usize>,
}

impl Default for ProbeValues {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeValues {
    pub fn new() -> Self {
        Self {
            next: PROBE_SEED,
            enum_cursors: HashMap::new(),
        }
    }

    pub fn next_i64(&mut self) -> i64 {
        let value = self.next;
        self.next += 1;
        value
    }

    pub fn next_i32(&mut self) -> i32 {
        self.next_i64() as i32
    }

    pub fn next_f64(&mut self) -> f64 {
        self.next_i64() as f64 + 0.5
    }

    pub fn next_text(&mut self) -> String {
        format!("probe-{}", self.next_i64())
    }

    pub fn next_uuid(&mut self) -> Uuid {
        Uuid::new_v4()
    }

    pub fn next_timestamp(&mut self) -> DateTime<Utc> {
        DateTime::<Utc>::default() + Duration::days(self.next_i64())
    }

    /// Next unused variant of `E`; wraps around once every variant is taken
    pub fn next_enum<E: QueryEnum>(&mut self) -> Option<E> {
        let variants = E::variants();
        if variants.is_empty() {
            return None;
        }
        let cursor = self.enum_cursors.entry(TypeId::of::<E>()).or_insert(0);
        let value = variants[*cursor % variants.len()];
        *cursor += 1;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Level {
        Low,
        High,
    }

    impl QueryEnum for Level {
        fn variants() -> &'static [Self] {
            &[Level::Low, Level::High]
        }

        fn name(&self) -> &'static str {
            match self {
                Level::Low => "Low",
                Level::High => "High",
            }
        }

        fn ordinal(&self) -> i64 {
            *self as i64
        }
    }

    #[test]
    fn test_probes_are_distinct_across_types() {
        let mut probe = ProbeValues::new();
        let a = probe.next_i32() as i64;
        let b = probe.next_i64();
        let text = probe.next_text();
        assert_ne!(a, b);
        assert_ne!(text, format!("probe-{}", b));
        assert_ne!(probe.next_timestamp(), probe.next_timestamp());
        assert_ne!(probe.next_uuid(), probe.next_uuid());
    }

    #[test]
    fn test_enum_probes_walk_variants() {
        let mut probe = ProbeValues::new();
        assert_eq!(probe.next_enum::<Level>(), Some(Level::Low));
        assert_eq!(probe.next_enum::<Level>(), Some(Level::High));
        assert_eq!(probe.next_enum::<Level>(), Some(Level::Low));
    }
}
