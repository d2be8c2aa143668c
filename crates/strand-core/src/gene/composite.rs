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

//! Composite genes: object, optional, array and choice.
//!
//! A composite's children are fixed at construction. Only [`ArrayGene`]
//! changes its topology, and only within `[min_size, max_size]`.

use super::{Gene, GeneKind, OPTIONAL_TOGGLE_WEIGHT};
use crate::randomness::Randomness;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Random array sizes are drawn from `[min_size, min(max_size, min_size + this)]`.
pub const MAX_RANDOM_ARRAY_EXTRA: usize = 5;

/// Probability that a randomized optional ends up active.
const OPTIONAL_ACTIVE_PROBABILITY: f64 = 0.5;

/// Probability that mutating an active optional switches it off.
const OPTIONAL_DEACTIVATE_PROBABILITY: f64 = 0.1;

/// Named, ordered fields. Printed as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectGene {
    pub fields: Vec<Gene>,
}

impl ObjectGene {
    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        let previous = force_new.then(|| self.to_json());
        for field in &mut self.fields {
            field.randomize(rng, false);
        }
        if previous.is_some_and(|p| p == self.to_json()) {
            self.mutate(rng);
        }
    }

    /// Mutates one mutable field, chosen by weight.
    pub fn mutate(&mut self, rng: &mut Randomness) {
        let weights: Vec<f64> = self
            .fields
            .iter()
            .map(|f| if f.is_mutable() { f.mutation_weight() } else { 0.0 })
            .collect();
        if weights.iter().all(|w| *w == 0.0) {
            return;
        }
        if let Some(i) = rng.choose_weighted_index(&weights) {
            self.fields[i].mutate(rng);
        }
    }

    pub fn mutation_weight(&self) -> f64 {
        self.fields.iter().map(Gene::mutation_weight).sum()
    }

    /// Fields that are switched-off non-nullable optionals are omitted;
    /// switched-off nullable ones are sent as `null`.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for field in &self.fields {
            if let GeneKind::Optional(opt) = &field.kind {
                if !opt.active && !opt.nullable {
                    continue;
                }
            }
            map.insert(field.name.clone(), field.to_json());
        }
        Value::Object(map)
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let Value::Object(map) = json else {
            return Err(format!("cannot bind {} to an object", json));
        };
        let mut candidate = self.clone();
        for field in &mut candidate.fields {
            match map.get(&field.name) {
                Some(v) => field.set_from_json(v).map_err(|e| e.to_string())?,
                None => {
                    if let GeneKind::Optional(opt) = &mut field.kind {
                        opt.active = false;
                    }
                }
            }
        }
        *self = candidate;
        Ok(())
    }
}

/// A gene that may be left out (or sent as `null` when `nullable`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionalGene {
    pub gene: Box<Gene>,
    pub active: bool,
    pub nullable: bool,
}

impl OptionalGene {
    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        let was_active = self.active;
        self.active = rng.next_bool(OPTIONAL_ACTIVE_PROBABILITY);
        if self.active {
            self.gene.randomize(rng, force_new && was_active);
        } else if force_new && !was_active {
            self.active = true;
            self.gene.randomize(rng, false);
        }
    }

    pub fn mutate(&mut self, rng: &mut Randomness) {
        if !self.active {
            self.active = true;
            if !self.gene.is_locally_valid() {
                self.gene.randomize(rng, false);
            }
        } else if !self.gene.is_mutable() || rng.next_bool(OPTIONAL_DEACTIVATE_PROBABILITY) {
            self.active = false;
        } else {
            self.gene.mutate(rng);
        }
    }

    pub fn mutation_weight(&self) -> f64 {
        OPTIONAL_TOGGLE_WEIGHT + self.gene.mutation_weight()
    }

    pub fn to_json(&self) -> Value {
        if self.active {
            self.gene.to_json()
        } else {
            Value::Null
        }
    }

    pub fn printable(&self) -> String {
        match (self.active, self.nullable) {
            (true, _) => self.gene.printable(),
            (false, true) => "null".to_string(),
            (false, false) => String::new(),
        }
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        if json.is_null() {
            self.active = false;
            return Ok(());
        }
        self.gene.set_from_json(json).map_err(|e| e.to_string())?;
        self.active = true;
        Ok(())
    }
}

/// Variable-length collection built from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayGene {
    pub template: Box<Gene>,
    pub elements: Vec<Gene>,
    pub min_size: usize,
    pub max_size: usize,
}

impl ArrayGene {
    fn new_element(&self, rng: &mut Randomness) -> Gene {
        let mut element = (*self.template).clone();
        element.name = format!("{}[{}]", self.template.name, self.elements.len());
        element.randomize(rng, false);
        element
    }

    fn rename_elements(&mut self) {
        for (i, element) in self.elements.iter_mut().enumerate() {
            element.name = format!("{}[{}]", self.template.name, i);
        }
    }

    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        if self.min_size > self.max_size {
            return;
        }
        let previous = force_new.then(|| self.to_json());
        let upper = self.max_size.min(self.min_size + MAX_RANDOM_ARRAY_EXTRA);
        let size = rng.next_usize(self.min_size, upper);
        self.elements.clear();
        for _ in 0..size {
            let element = self.new_element(rng);
            self.elements.push(element);
        }
        if previous.is_some_and(|p| p == self.to_json()) {
            self.mutate(rng);
        }
    }

    /// Grows, shrinks or mutates one element, staying within the size bounds.
    pub fn mutate(&mut self, rng: &mut Randomness) {
        let can_grow = self.elements.len() < self.max_size;
        let can_shrink = self.elements.len() > self.min_size;
        let mutable: Vec<usize> = (0..self.elements.len())
            .filter(|i| self.elements[*i].is_mutable())
            .collect();
        match rng.next_i64(0, 2) {
            0 if can_grow => {
                let element = self.new_element(rng);
                let at = rng.next_usize(0, self.elements.len());
                self.elements.insert(at, element);
                self.rename_elements();
            }
            1 if can_shrink => {
                if let Some(at) = rng.choose_index(self.elements.len()) {
                    self.elements.remove(at);
                    self.rename_elements();
                }
            }
            _ if !mutable.is_empty() => {
                if let Some(i) = rng.choose(&mutable) {
                    self.elements[*i].mutate(rng);
                }
            }
            _ if can_grow => {
                let element = self.new_element(rng);
                self.elements.push(element);
            }
            _ if can_shrink => {
                self.elements.pop();
            }
            _ => {}
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.min_size < self.max_size || self.elements.iter().any(Gene::is_mutable)
    }

    pub fn mutation_weight(&self) -> f64 {
        OPTIONAL_TOGGLE_WEIGHT + self.elements.iter().map(Gene::mutation_weight).sum::<f64>()
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.elements.iter().map(Gene::to_json).collect())
    }

    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        let Value::Array(items) = json else {
            return Err(format!("cannot bind {} to an array", json));
        };
        if items.len() < self.min_size || items.len() > self.max_size {
            return Err(format!(
                "{} elements outside [{}, {}]",
                items.len(),
                self.min_size,
                self.max_size
            ));
        }
        let mut elements = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let mut element = (*self.template).clone();
            element.name = format!("{}[{}]", self.template.name, i);
            element.set_from_json(item).map_err(|e| e.to_string())?;
            elements.push(element);
        }
        self.elements = elements;
        Ok(())
    }
}

/// Disjunction: exactly one option is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceGene {
    pub options: Vec<Gene>,
    pub active: usize,
}

impl ChoiceGene {
    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        if self.options.is_empty() {
            return;
        }
        let previous = self.active;
        self.active = rng.next_usize(0, self.options.len() - 1);
        let same_branch = self.active == previous;
        self.options[self.active].randomize(rng, force_new && same_branch);
    }

    pub fn mutate(&mut self, rng: &mut Randomness) {
        let Some(current) = self.options.get(self.active) else {
            return;
        };
        if self.options.len() > 1 && (!current.is_mutable() || rng.coin()) {
            let offset = rng.next_usize(1, self.options.len() - 1);
            self.active = (self.active + offset) % self.options.len();
        } else if let Some(option) = self.options.get_mut(self.active) {
            option.mutate(rng);
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.options.len() > 1 || self.options.iter().any(Gene::is_mutable)
    }

    pub fn mutation_weight(&self) -> f64 {
        OPTIONAL_TOGGLE_WEIGHT + self.options.iter().map(Gene::mutation_weight).sum::<f64>()
    }

    pub fn to_json(&self) -> Value {
        self.options.get(self.active).map(Gene::to_json).unwrap_or(Value::Null)
    }

    /// Binds the first option that accepts `json`.
    pub fn set_from_json(&mut self, json: &Value) -> Result<(), String> {
        for (i, option) in self.options.iter().enumerate() {
            let mut candidate = option.clone();
            if candidate.set_from_json(json).is_ok() {
                self.options[i] = candidate;
                self.active = i;
                return Ok(());
            }
        }
        Err(format!("no option accepts {}", json))
    }
}
