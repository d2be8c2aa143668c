// Copyright 2024 Strand Project
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Numeric leaf genes.

use crate::randomness::Randomness;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Range used when an integer gene has no declared bound on a side.
const UNBOUNDED_RANDOM_RANGE: i64 = i32::MAX as i64;

/// Random values are drawn from this small window with probability
/// [`SMALL_VALUE_PROBABILITY`]; small values hit more branches.
const SMALL_VALUE_RANGE: i64 = 100;
const SMALL_VALUE_PROBABILITY: f64 = 0.5;

/// Largest exponent used for delta mutations (`±2^k`).
const MAX_DELTA_EXPONENT: u32 = 16;

/// Integer value, optionally bounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerGene {
    pub value: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl IntegerGene {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        let value = min.unwrap_or(0).max(0).min(max.unwrap_or(i64::MAX));
        let value = if let Some(lo) = min { value.max(lo) } else { value };
        Self { value, min, max }
    }

    /// Missing bounds are taken relative to the given one, so a one-sided
    /// domain never lies outside the random range.
    fn lower(&self) -> i64 {
        match (self.min, self.max) {
            (Some(lo), _) => lo,
            (None, Some(hi)) => hi.min(0).saturating_sub(UNBOUNDED_RANDOM_RANGE),
            (None, None) => -UNBOUNDED_RANDOM_RANGE,
        }
    }

    fn upper(&self) -> i64 {
        match (self.min, self.max) {
            (_, Some(hi)) => hi,
            (Some(lo), None) => lo.max(0).saturating_add(UNBOUNDED_RANDOM_RANGE),
            (None, None) => UNBOUNDED_RANDOM_RANGE,
        }
    }

    /// Whether more than one value is admissible.
    pub fn has_alternatives(&self) -> bool {
        self.lower() < self.upper()
    }

    pub fn is_locally_valid(&self) -> bool {
        self.min.map_or(true, |lo| self.value >= lo) && self.max.map_or(true, |hi| self.value <= hi)
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        let (lo, hi) = (self.lower(), self.upper());
        if lo > hi {
            return;
        }
        let previous = self.value;
        self.value = if rng.next_bool(SMALL_VALUE_PROBABILITY) {
            let small_lo = lo.max(-SMALL_VALUE_RANGE);
            let small_hi = hi.min(SMALL_VALUE_RANGE);
            if small_lo <= small_hi {
                rng.next_i64(small_lo, small_hi)
            } else {
                rng.next_i64(lo, hi)
            }
        } else {
            rng.next_i64(lo, hi)
        };
        if force_new && self.value == previous && self.has_alternatives() {
            self.value = if previous < hi { previous + 1 } else { previous - 1 };
        }
    }

    /// Small step mutation: shift by `±2^k`, clamped into the bounds.
    pub fn mutate(&mut self, rng: &mut Randomness) {
        if !self.has_alternatives() {
            return;
        }
        let exponent = rng.next_i64(0, MAX_DELTA_EXPONENT as i64) as u32;
        let delta = 1i64 << exponent;
        let previous = self.value;
        let shifted = if rng.coin() {
            previous.saturating_add(delta)
        } else {
            previous.saturating_sub(delta)
        };
        self.value = shifted.clamp(self.lower(), self.upper());
        if self.value == previous {
            self.value = if previous < self.upper() { previous + 1 } else { previous - 1 };
        }
    }

    pub fn printable(&self) -> String {
        self.value.to_string()
    }

    pub fn to_json(&self) -> Value {
        Value::from(self.value)
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let parsed = match json {
            Value::Number(n) => n.as_i64().ok_or_else(|| format!("not an integer: {}", n))?,
            Value::String(s) => s.trim().parse::<i64>().map_err(|e| e.to_string())?,
            other => return Err(format!("cannot bind {} to an integer", other)),
        };
        let candidate = Self { value: parsed, ..self.clone() };
        if !candidate.is_locally_valid() {
            return Err(format!("{} outside bounds", parsed));
        }
        self.value = parsed;
        Ok(())
    }
}

/// Floating point value, optionally bounded and with a fixed number of decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubleGene {
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Number of decimal places, `None` for full precision.
    pub precision: Option<u32>,
}

impl DoubleGene {
    pub fn new(min: Option<f64>, max: Option<f64>, precision: Option<u32>) -> Self {
        let mut gene = Self { value: 0.0, min, max, precision };
        let (lo, hi) = (gene.lower(), gene.upper());
        if lo <= hi {
            gene.value = gene.round(gene.value.clamp(lo, hi));
        } else if lo.is_finite() {
            gene.value = lo;
        }
        gene
    }

    fn lower(&self) -> f64 {
        let range = UNBOUNDED_RANDOM_RANGE as f64;
        match (self.min, self.max) {
            (Some(lo), _) => lo,
            (None, Some(hi)) => hi.min(0.0) - range,
            (None, None) => -range,
        }
    }

    fn upper(&self) -> f64 {
        let range = UNBOUNDED_RANDOM_RANGE as f64;
        match (self.min, self.max) {
            (_, Some(hi)) => hi,
            (Some(lo), None) => lo.max(0.0) + range,
            (None, None) => range,
        }
    }

    fn round(&self, v: f64) -> f64 {
        match self.precision {
            Some(p) => {
                let factor = 10f64.powi(p as i32);
                (v * factor).round() / factor
            }
            None => v,
        }
    }

    pub fn has_alternatives(&self) -> bool {
        self.lower() < self.upper()
    }

    pub fn is_locally_valid(&self) -> bool {
        self.value.is_finite()
            && self.min.map_or(true, |lo| self.value >= lo)
            && self.max.map_or(true, |hi| self.value <= hi)
            && self.round(self.value) == self.value
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        let (lo, hi) = (self.lower(), self.upper());
        if !(lo <= hi) {
            return;
        }
        let previous = self.value;
        let raw = if rng.next_bool(SMALL_VALUE_PROBABILITY) {
            let small_lo = lo.max(-(SMALL_VALUE_RANGE as f64));
            let small_hi = hi.min(SMALL_VALUE_RANGE as f64);
            if small_lo < small_hi {
                rng.next_f64_in(small_lo, small_hi)
            } else {
                rng.next_f64_in(lo, hi)
            }
        } else {
            rng.next_f64_in(lo, hi)
        };
        self.value = self.round(raw).clamp(lo, hi);
        if force_new && self.value == previous && self.has_alternatives() {
            self.step_away_from(previous);
        }
    }

    /// Gaussian step scaled by a random power of ten.
    pub fn mutate(&mut self, rng: &mut Randomness) {
        if !self.has_alternatives() {
            return;
        }
        let previous = self.value;
        let scale = 10f64.powi(rng.next_i64(-2, 3) as i32);
        let shifted = previous + rng.next_gaussian() * scale;
        self.value = self.round(shifted).clamp(self.lower(), self.upper());
        if self.value == previous {
            self.step_away_from(previous);
        }
    }

    fn step_away_from(&mut self, previous: f64) {
        let step = match self.precision {
            Some(p) => 10f64.powi(-(p as i32)),
            None => 1.0,
        };
        let up = self.round(previous + step);
        self.value = if up <= self.upper() { up } else { self.round(previous - step).max(self.lower()) };
    }

    pub fn printable(&self) -> String {
        match self.precision {
            Some(p) => format!("{:.*}", p as usize, self.value),
            None => self.value.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::Number::from_f64(self.value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let parsed = match json {
            Value::Number(n) => n.as_f64().ok_or_else(|| format!("not a number: {}", n))?,
            Value::String(s) => s.trim().parse::<f64>().map_err(|e| e.to_string())?,
            other => return Err(format!("cannot bind {} to a double", other)),
        };
        let candidate = Self { value: self.round(parsed), ..self.clone() };
        if !candidate.is_locally_valid() {
            return Err(format!("{} outside bounds", parsed));
        }
        self.value = candidate.value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_randomize_respects_bounds() {
        let mut rng = Randomness::with_seed(11);
        let mut gene = IntegerGene::new(Some(-5), Some(5));
        for _ in 0..200 {
            gene.randomize(&mut rng, false);
            assert!(gene.is_locally_valid());
            gene.mutate(&mut rng);
            assert!(gene.is_locally_valid());
        }
    }

    #[test]
    fn test_integer_force_new_value() {
        let mut rng = Randomness::with_seed(2);
        let mut gene = IntegerGene::new(Some(0), Some(1));
        for _ in 0..50 {
            let before = gene.value;
            gene.randomize(&mut rng, true);
            assert_ne!(before, gene.value);
        }
    }

    #[test]
    fn test_integer_single_value_domain() {
        let mut rng = Randomness::with_seed(2);
        let mut gene = IntegerGene::new(Some(7), Some(7));
        assert_eq!(gene.value, 7);
        gene.randomize(&mut rng, true);
        assert_eq!(gene.value, 7);
        assert!(!gene.has_alternatives());
    }

    #[test]
    fn test_integer_json_binding() {
        let mut gene = IntegerGene::new(Some(0), Some(10));
        gene.set_from_json(&serde_json::json!(4)).unwrap();
        assert_eq!(gene.value, 4);
        gene.set_from_json(&serde_json::json!("9")).unwrap();
        assert_eq!(gene.value, 9);
        assert!(gene.set_from_json(&serde_json::json!(11)).is_err());
        assert_eq!(gene.value, 9);
    }

    #[test]
    fn test_double_precision_kept() {
        let mut rng = Randomness::with_seed(5);
        let mut gene = DoubleGene::new(Some(0.0), Some(10.0), Some(2));
        for _ in 0..200 {
            gene.randomize(&mut rng, true);
            assert!(gene.is_locally_valid(), "{}", gene.value);
            gene.mutate(&mut rng);
            assert!(gene.is_locally_valid(), "{}", gene.value);
        }
        gene.value = 1.5;
        assert_eq!(gene.printable(), "1.50");
    }

    #[test]
    fn test_double_lower_bound_beyond_random_range() {
        let mut rng = Randomness::with_seed(9);
        let mut gene = DoubleGene::new(Some(3e9), None, None);
        assert_eq!(gene.value, 3e9);
        assert!(gene.has_alternatives());
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..50 {
            gene.randomize(&mut rng, true);
            assert!(gene.is_locally_valid(), "{}", gene.value);
            gene.mutate(&mut rng);
            assert!(gene.is_locally_valid(), "{}", gene.value);
            seen.insert(gene.value.to_bits());
        }
        assert!(seen.len() > 1);

        let gene = DoubleGene::new(None, Some(-3e9), Some(1));
        assert!(gene.is_locally_valid(), "{}", gene.value);
        assert!(gene.has_alternatives());
    }

    #[test]
    fn test_integer_lower_bound_beyond_random_range() {
        let mut rng = Randomness::with_seed(9);
        let mut gene = IntegerGene::new(Some(3_000_000_000), None);
        assert!(gene.has_alternatives());
        for _ in 0..50 {
            let before = gene.value;
            gene.randomize(&mut rng, true);
            assert_ne!(before, gene.value);
            assert!(gene.value >= 3_000_000_000);
            gene.mutate(&mut rng);
            assert!(gene.is_locally_valid());
        }

        let mut gene = IntegerGene::new(None, Some(-3_000_000_000));
        assert!(gene.has_alternatives());
        gene.randomize(&mut rng, true);
        assert!(gene.is_locally_valid());
        let mut gene = IntegerGene::new(Some(i64::MAX - 1), None);
        gene.randomize(&mut rng, true);
        assert!(gene.is_locally_valid());
    }
}
