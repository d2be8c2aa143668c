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

//! Boolean, string, enum and binary leaf genes.

use crate::randomness::Randomness;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper length used when sampling strings and blobs with a large or no maximum.
pub const MAX_RANDOM_LENGTH: usize = 16;

/// How many times a forced randomization retries before editing in place.
const FORCE_NEW_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanGene {
    pub value: bool,
}

impl BooleanGene {
    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        self.value = if force_new { !self.value } else { rng.coin() };
    }

    pub fn mutate(&mut self) {
        self.value = !self.value;
    }

    pub fn printable(&self) -> String {
        self.value.to_string()
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        self.value = match json {
            Value::Bool(b) => *b,
            Value::String(s) if s.eq_ignore_ascii_case("true") => true,
            Value::String(s) if s.eq_ignore_ascii_case("false") => false,
            other => return Err(format!("cannot bind {} to a boolean", other)),
        };
        Ok(())
    }
}

/// Free text with length bounds (in characters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringGene {
    pub value: String,
    pub min_length: usize,
    pub max_length: usize,
}

impl StringGene {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            value: "a".repeat(min_length),
            min_length,
            max_length,
        }
    }

    fn len(&self) -> usize {
        self.value.chars().count()
    }

    fn random_upper(&self) -> usize {
        self.max_length.min(self.min_length.max(MAX_RANDOM_LENGTH))
    }

    pub fn has_alternatives(&self) -> bool {
        self.max_length > 0 && self.min_length <= self.max_length
    }

    pub fn is_locally_valid(&self) -> bool {
        let len = self.len();
        len >= self.min_length && len <= self.max_length
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        if self.min_length > self.max_length {
            return;
        }
        let previous = self.value.clone();
        for _ in 0..FORCE_NEW_ATTEMPTS {
            self.value = rng.next_word(self.min_length, self.random_upper());
            if !force_new || self.value != previous || !self.has_alternatives() {
                return;
            }
        }
        self.replace_char(rng);
    }

    /// Character-level edit: insert, delete or replace one char.
    pub fn mutate(&mut self, rng: &mut Randomness) {
        if !self.has_alternatives() {
            return;
        }
        let len = self.len();
        let can_grow = len < self.max_length;
        let can_shrink = len > self.min_length;
        match rng.next_i64(0, 2) {
            0 if can_grow => {
                let at = rng.next_usize(0, len);
                let mut chars: Vec<char> = self.value.chars().collect();
                chars.insert(at, rng.next_word_char());
                self.value = chars.into_iter().collect();
            }
            1 if can_shrink => {
                let at = rng.next_usize(0, len - 1);
                let mut chars: Vec<char> = self.value.chars().collect();
                chars.remove(at);
                self.value = chars.into_iter().collect();
            }
            _ if len > 0 => self.replace_char(rng),
            _ => self.randomize(rng, true),
        }
    }

    fn replace_char(&mut self, rng: &mut Randomness) {
        let mut chars: Vec<char> = self.value.chars().collect();
        if chars.is_empty() {
            if self.max_length > 0 {
                self.value = rng.next_word_char().to_string();
            }
            return;
        }
        let at = rng.next_usize(0, chars.len() - 1);
        let old = chars[at];
        let mut replacement = rng.next_word_char();
        while replacement == old {
            replacement = rng.next_word_char();
        }
        chars[at] = replacement;
        self.value = chars.into_iter().collect();
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let text = match json {
            Value::String(s) => s.clone(),
            Value::Null => return Err("cannot bind null to a string".to_string()),
            other => other.to_string(),
        };
        let candidate = Self { value: text, ..self.clone() };
        if !candidate.is_locally_valid() {
            return Err(format!("length of '{}' outside bounds", candidate.value));
        }
        self.value = candidate.value;
        Ok(())
    }
}

/// One value out of a closed list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumGene {
    pub values: Vec<String>,
    pub index: usize,
}

impl EnumGene {
    pub fn has_alternatives(&self) -> bool {
        self.values.len() > 1
    }

    pub fn is_locally_valid(&self) -> bool {
        self.index < self.values.len()
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        if self.values.is_empty() {
            return;
        }
        if force_new && self.has_alternatives() {
            let offset = rng.next_usize(1, self.values.len() - 1);
            self.index = (self.index + offset) % self.values.len();
        } else {
            self.index = rng.next_usize(0, self.values.len() - 1);
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.values.get(self.index).map(|s| s.as_str())
    }

    pub fn printable(&self) -> String {
        self.value().unwrap_or_default().to_string()
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let wanted = match json {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.values.iter().position(|v| *v == wanted) {
            Some(i) => {
                self.index = i;
                Ok(())
            }
            None => Err(format!("'{}' is not one of {:?}", wanted, self.values)),
        }
    }
}

/// Binary blob, printed as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryGene {
    pub bytes: Vec<u8>,
    pub min_length: usize,
    pub max_length: usize,
}

impl BinaryGene {
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            bytes: vec![0; min_length],
            min_length,
            max_length,
        }
    }

    pub fn has_alternatives(&self) -> bool {
        self.max_length > 0 && self.min_length <= self.max_length
    }

    pub fn is_locally_valid(&self) -> bool {
        self.bytes.len() >= self.min_length && self.bytes.len() <= self.max_length
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        if self.min_length > self.max_length {
            return;
        }
        let previous = self.bytes.clone();
        let upper = self.max_length.min(self.min_length.max(MAX_RANDOM_LENGTH));
        let len = rng.next_usize(self.min_length, upper);
        self.bytes = (0..len).map(|_| rng.next_byte()).collect();
        if force_new && self.bytes == previous && self.has_alternatives() {
            self.flip_byte(rng);
        }
    }

    pub fn mutate(&mut self, rng: &mut Randomness) {
        if !self.has_alternatives() {
            return;
        }
        if self.bytes.len() < self.max_length && rng.coin() {
            self.bytes.push(rng.next_byte());
        } else {
            self.flip_byte(rng);
        }
    }

    fn flip_byte(&mut self, rng: &mut Randomness) {
        if self.bytes.is_empty() {
            self.bytes.push(rng.next_byte() | 1);
            return;
        }
        let at = rng.next_usize(0, self.bytes.len() - 1);
        let bit = 1u8 << rng.next_i64(0, 7);
        self.bytes[at] ^= bit;
    }

    pub fn printable(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let Value::String(encoded) = json else {
            return Err(format!("cannot bind {} to binary", json));
        };
        let decoded = STANDARD.decode(encoded).map_err(|e| e.to_string())?;
        let candidate = Self { bytes: decoded, ..self.clone() };
        if !candidate.is_locally_valid() {
            return Err("binary length outside bounds".to_string());
        }
        self.bytes = candidate.bytes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_edits_stay_in_bounds() {
        let mut rng = Randomness::with_seed(9);
        let mut gene = StringGene::new(2, 4);
        for _ in 0..300 {
            gene.mutate(&mut rng);
            assert!(gene.is_locally_valid(), "'{}'", gene.value);
            gene.randomize(&mut rng, true);
            assert!(gene.is_locally_valid(), "'{}'", gene.value);
        }
    }

    #[test]
    fn test_string_force_new() {
        let mut rng = Randomness::with_seed(9);
        let mut gene = StringGene::new(1, 1);
        for _ in 0..100 {
            let before = gene.value.clone();
            gene.randomize(&mut rng, true);
            assert_ne!(before, gene.value);
        }
    }

    #[test]
    fn test_enum_force_new_and_binding() {
        let mut rng = Randomness::with_seed(4);
        let mut gene = EnumGene {
            values: vec!["red".into(), "green".into(), "blue".into()],
            index: 0,
        };
        for _ in 0..50 {
            let before = gene.index;
            gene.randomize(&mut rng, true);
            assert_ne!(before, gene.index);
            assert!(gene.is_locally_valid());
        }
        gene.set_from_json(&serde_json::json!("blue")).unwrap();
        assert_eq!(gene.printable(), "blue");
        assert!(gene.set_from_json(&serde_json::json!("pink")).is_err());
    }

    #[test]
    fn test_empty_enum_is_invalid() {
        let mut rng = Randomness::with_seed(4);
        let mut gene = EnumGene { values: vec![], index: 0 };
        gene.randomize(&mut rng, true);
        assert!(!gene.is_locally_valid());
    }

    #[test]
    fn test_binary_base64_round() {
        let mut gene = BinaryGene::new(0, 8);
        gene.bytes = vec![1, 2, 3];
        assert_eq!(gene.printable(), "AQID");
        let mut other = BinaryGene::new(0, 8);
        other.set_from_json(&serde_json::json!("AQID")).unwrap();
        assert_eq!(other.bytes, vec![1, 2, 3]);
    }
}
