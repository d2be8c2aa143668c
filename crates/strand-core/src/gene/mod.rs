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

//! # Gene model
//!
//! A [`Gene`] is a named value holder; its [`GeneKind`] is a closed sum over
//! every supported leaf and composite kind. All behaviour is dispatched by
//! `match`, so adding a kind makes every operation fail to compile until it
//! is handled.
//!
//! Genes are plain owned trees. Cloning a gene deep-copies it; nested genes
//! are addressed by a [`GenePath`] of child indices rather than by parent
//! links.
//!
//! Every operation preserves local validity: after `randomize` or `mutate`
//! a gene whose domain is non-empty satisfies [`Gene::is_locally_valid`].

pub mod composite;
pub mod datetime;
pub mod numeric;
pub mod pattern;
pub mod text;

pub use composite::{ArrayGene, ChoiceGene, ObjectGene, OptionalGene};
pub use datetime::{DateGene, DateTimeGene, TimeGene};
pub use numeric::{DoubleGene, IntegerGene};
pub use pattern::RegexGene;
pub use text::{BinaryGene, BooleanGene, EnumGene, StringGene};

use crate::errors::SearchError;
use crate::randomness::Randomness;
use crate::types::GenePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Weight of a leaf gene.
pub const LEAF_WEIGHT: f64 = 1.0;

/// Weight added by wrappers that carry an on/off or size decision
/// (optional, array, choice) on top of their children.
pub const OPTIONAL_TOGGLE_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneKind {
    Integer(IntegerGene),
    Double(DoubleGene),
    Boolean(BooleanGene),
    String(StringGene),
    Enum(EnumGene),
    Date(DateGene),
    Time(TimeGene),
    DateTime(DateTimeGene),
    Binary(BinaryGene),
    Regex(RegexGene),
    Object(ObjectGene),
    Optional(OptionalGene),
    Array(ArrayGene),
    Choice(ChoiceGene),
}

/// A named gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub name: String,
    pub kind: GeneKind,
}

impl Gene {
    pub fn new(name: impl Into<String>, kind: GeneKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, GeneKind::Integer(IntegerGene::new(None, None)))
    }

    pub fn integer_in(name: impl Into<String>, min: i64, max: i64) -> Self {
        Self::new(name, GeneKind::Integer(IntegerGene::new(Some(min), Some(max))))
    }

    pub fn double(name: impl Into<String>, min: Option<f64>, max: Option<f64>, precision: Option<u32>) -> Self {
        Self::new(name, GeneKind::Double(DoubleGene::new(min, max, precision)))
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, GeneKind::Boolean(BooleanGene { value: false }))
    }

    pub fn string(name: impl Into<String>, min_length: usize, max_length: usize) -> Self {
        Self::new(name, GeneKind::String(StringGene::new(min_length, max_length)))
    }

    pub fn enumeration<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::new(name, GeneKind::Enum(EnumGene { values, index: 0 }))
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, GeneKind::Date(DateGene::default()))
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, GeneKind::Time(TimeGene::default()))
    }

    pub fn date_time(name: impl Into<String>) -> Self {
        Self::new(name, GeneKind::DateTime(DateTimeGene::default()))
    }

    pub fn binary(name: impl Into<String>, min_length: usize, max_length: usize) -> Self {
        Self::new(name, GeneKind::Binary(BinaryGene::new(min_length, max_length)))
    }

    /// Fails with [`SearchError::ConfigError`] on patterns the generator cannot handle.
    pub fn regex(name: impl Into<String>, pattern: &str) -> Result<Self, SearchError> {
        Ok(Self::new(name, GeneKind::Regex(RegexGene::new(pattern)?)))
    }

    pub fn object(name: impl Into<String>, fields: Vec<Gene>) -> Self {
        Self::new(name, GeneKind::Object(ObjectGene { fields }))
    }

    /// Wraps `gene` into an optional that is initially active. Takes the inner name.
    pub fn optional(gene: Gene) -> Self {
        Self::wrap_optional(gene, false)
    }

    /// Like [`Gene::optional`], but a switched-off value is sent as `null`.
    pub fn nullable(gene: Gene) -> Self {
        Self::wrap_optional(gene, true)
    }

    fn wrap_optional(gene: Gene, nullable: bool) -> Self {
        let name = gene.name.clone();
        Self::new(
            name,
            GeneKind::Optional(OptionalGene {
                gene: Box::new(gene),
                active: true,
                nullable,
            }),
        )
    }

    pub fn array(name: impl Into<String>, template: Gene, min_size: usize, max_size: usize) -> Self {
        let mut array = ArrayGene {
            template: Box::new(template),
            elements: Vec::new(),
            min_size,
            max_size,
        };
        for i in 0..min_size {
            let mut element = (*array.template).clone();
            element.name = format!("{}[{}]", array.template.name, i);
            array.elements.push(element);
        }
        Self::new(name, GeneKind::Array(array))
    }

    pub fn choice(name: impl Into<String>, options: Vec<Gene>) -> Self {
        Self::new(name, GeneKind::Choice(ChoiceGene { options, active: 0 }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &GeneKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(
            self.kind,
            GeneKind::Object(_) | GeneKind::Optional(_) | GeneKind::Array(_) | GeneKind::Choice(_)
        )
    }

    /// Direct children, in addressing order.
    pub fn children(&self) -> Vec<&Gene> {
        match &self.kind {
            GeneKind::Object(o) => o.fields.iter().collect(),
            GeneKind::Optional(o) => vec![o.gene.as_ref()],
            GeneKind::Array(a) => a.elements.iter().collect(),
            GeneKind::Choice(c) => c.options.iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Gene> {
        match &mut self.kind {
            GeneKind::Object(o) => o.fields.iter_mut().collect(),
            GeneKind::Optional(o) => vec![o.gene.as_mut()],
            GeneKind::Array(a) => a.elements.iter_mut().collect(),
            GeneKind::Choice(c) => c.options.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    pub fn gene_at(&self, path: &GenePath) -> Option<&Gene> {
        let mut current = self;
        for step in path.steps() {
            current = current.children().into_iter().nth(*step)?;
        }
        Some(current)
    }

    pub fn gene_at_mut(&mut self, path: &GenePath) -> Option<&mut Gene> {
        let mut current = self;
        for step in path.steps() {
            current = current.children_mut().into_iter().nth(*step)?;
        }
        Some(current)
    }

    /// Pre-order walk of the tree, each gene with its path from `self`.
    pub fn flat_view(&self) -> Vec<(GenePath, &Gene)> {
        let mut out = Vec::new();
        self.collect_flat(GenePath::root(), &mut out);
        out
    }

    fn collect_flat<'a>(&'a self, path: GenePath, out: &mut Vec<(GenePath, &'a Gene)>) {
        let children = self.children();
        out.push((path.clone(), self));
        for (i, child) in children.into_iter().enumerate() {
            child.collect_flat(path.child(i), out);
        }
    }

    /// Assigns a random valid value. With `force_new`, the printed value
    /// differs from the current one whenever the domain allows it.
    pub fn randomize(&mut self, rng: &mut Randomness, force_new: bool) {
        match &mut self.kind {
            GeneKind::Integer(g) => g.randomize(rng, force_new),
            GeneKind::Double(g) => g.randomize(rng, force_new),
            GeneKind::Boolean(g) => g.randomize(rng, force_new),
            GeneKind::String(g) => g.randomize(rng, force_new),
            GeneKind::Enum(g) => g.randomize(rng, force_new),
            GeneKind::Date(g) => g.randomize(rng, force_new),
            GeneKind::Time(g) => g.randomize(rng, force_new),
            GeneKind::DateTime(g) => g.randomize(rng, force_new),
            GeneKind::Binary(g) => g.randomize(rng, force_new),
            GeneKind::Regex(g) => g.randomize(rng, force_new),
            GeneKind::Object(g) => g.randomize(rng, force_new),
            GeneKind::Optional(g) => g.randomize(rng, force_new),
            GeneKind::Array(g) => g.randomize(rng, force_new),
            GeneKind::Choice(g) => g.randomize(rng, force_new),
        }
    }

    /// Value-level mutation: a small, kind-specific change.
    pub fn mutate(&mut self, rng: &mut Randomness) {
        match &mut self.kind {
            GeneKind::Integer(g) => g.mutate(rng),
            GeneKind::Double(g) => g.mutate(rng),
            GeneKind::Boolean(g) => g.mutate(),
            GeneKind::String(g) => g.mutate(rng),
            GeneKind::Enum(g) => g.randomize(rng, true),
            GeneKind::Date(g) => g.mutate(rng),
            GeneKind::Time(g) => g.mutate(rng),
            GeneKind::DateTime(g) => g.mutate(rng),
            GeneKind::Binary(g) => g.mutate(rng),
            GeneKind::Regex(g) => g.randomize(rng, true),
            GeneKind::Object(g) => g.mutate(rng),
            GeneKind::Optional(g) => g.mutate(rng),
            GeneKind::Array(g) => g.mutate(rng),
            GeneKind::Choice(g) => g.mutate(rng),
        }
    }

    /// Whether this gene and all its descendants satisfy their own constraints.
    pub fn is_locally_valid(&self) -> bool {
        match &self.kind {
            GeneKind::Integer(g) => g.is_locally_valid(),
            GeneKind::Double(g) => g.is_locally_valid(),
            GeneKind::Boolean(_) => true,
            GeneKind::String(g) => g.is_locally_valid(),
            GeneKind::Enum(g) => g.is_locally_valid(),
            GeneKind::Date(g) => g.is_locally_valid(),
            GeneKind::Time(g) => g.is_locally_valid(),
            GeneKind::DateTime(g) => g.is_locally_valid(),
            GeneKind::Binary(g) => g.is_locally_valid(),
            GeneKind::Regex(g) => g.is_locally_valid(),
            GeneKind::Object(g) => g.fields.iter().all(Gene::is_locally_valid),
            GeneKind::Optional(g) => !g.active || g.gene.is_locally_valid(),
            GeneKind::Array(g) => {
                g.elements.len() >= g.min_size
                    && g.elements.len() <= g.max_size
                    && g.elements.iter().all(Gene::is_locally_valid)
            }
            GeneKind::Choice(g) => g
                .options
                .get(g.active)
                .is_some_and(Gene::is_locally_valid),
        }
    }

    /// Whether mutation can produce another value at all.
    pub fn is_mutable(&self) -> bool {
        match &self.kind {
            GeneKind::Integer(g) => g.has_alternatives(),
            GeneKind::Double(g) => g.has_alternatives(),
            GeneKind::Boolean(_) => true,
            GeneKind::String(g) => g.has_alternatives(),
            GeneKind::Enum(g) => g.has_alternatives(),
            GeneKind::Date(g) => g.min_year <= g.max_year,
            GeneKind::Time(_) | GeneKind::DateTime(_) => true,
            GeneKind::Binary(g) => g.has_alternatives(),
            GeneKind::Regex(g) => g.has_alternatives(),
            GeneKind::Object(g) => g.fields.iter().any(Gene::is_mutable),
            GeneKind::Optional(_) => true,
            GeneKind::Array(g) => g.is_mutable(),
            GeneKind::Choice(g) => g.is_mutable(),
        }
    }

    /// Relative weight used when the mutator picks genes. Composites sum
    /// their children; wrappers add [`OPTIONAL_TOGGLE_WEIGHT`].
    pub fn mutation_weight(&self) -> f64 {
        match &self.kind {
            GeneKind::Object(g) => g.mutation_weight(),
            GeneKind::Optional(g) => g.mutation_weight(),
            GeneKind::Array(g) => g.mutation_weight(),
            GeneKind::Choice(g) => g.mutation_weight(),
            _ => LEAF_WEIGHT,
        }
    }

    /// Value as it is placed in a request (path segment, query value, ...).
    pub fn printable(&self) -> String {
        match &self.kind {
            GeneKind::Integer(g) => g.printable(),
            GeneKind::Double(g) => g.printable(),
            GeneKind::Boolean(g) => g.printable(),
            GeneKind::String(g) => g.value.clone(),
            GeneKind::Enum(g) => g.printable(),
            GeneKind::Date(g) => g.printable(),
            GeneKind::Time(g) => g.printable(),
            GeneKind::DateTime(g) => g.printable(),
            GeneKind::Binary(g) => g.printable(),
            GeneKind::Regex(g) => g.value.clone(),
            GeneKind::Object(g) => g.to_json().to_string(),
            GeneKind::Optional(g) => g.printable(),
            GeneKind::Array(g) => g.to_json().to_string(),
            GeneKind::Choice(g) => g.options.get(g.active).map(Gene::printable).unwrap_or_default(),
        }
    }

    pub fn to_json(&self) -> Value {
        match &self.kind {
            GeneKind::Integer(g) => g.to_json(),
            GeneKind::Double(g) => g.to_json(),
            GeneKind::Boolean(g) => Value::Bool(g.value),
            GeneKind::String(g) => Value::String(g.value.clone()),
            GeneKind::Regex(g) => Value::String(g.value.clone()),
            GeneKind::Enum(_)
            | GeneKind::Date(_)
            | GeneKind::Time(_)
            | GeneKind::DateTime(_)
            | GeneKind::Binary(_) => Value::String(self.printable()),
            GeneKind::Object(g) => g.to_json(),
            GeneKind::Optional(g) => g.to_json(),
            GeneKind::Array(g) => g.to_json(),
            GeneKind::Choice(g) => g.to_json(),
        }
    }

    /// Binds a concrete value. On error the gene is left unchanged.
    pub fn set_from_json(&mut self, json: &Value) -> Result<(), SearchError> {
        let result = match &mut self.kind {
            GeneKind::Integer(g) => g.set_from_json(json),
            GeneKind::Double(g) => g.set_from_json(json),
            GeneKind::Boolean(g) => g.set_from_json(json),
            GeneKind::String(g) => g.set_from_json(json),
            GeneKind::Enum(g) => g.set_from_json(json),
            GeneKind::Date(g) => g.set_from_json(json),
            GeneKind::Time(g) => g.set_from_json(json),
            GeneKind::DateTime(g) => g.set_from_json(json),
            GeneKind::Binary(g) => g.set_from_json(json),
            GeneKind::Regex(g) => g.set_from_json(json),
            GeneKind::Object(g) => g.set_from_json(json),
            GeneKind::Optional(g) => g.set_from_json(json),
            GeneKind::Array(g) => g.set_from_json(json),
            GeneKind::Choice(g) => g.set_from_json(json),
        };
        result.map_err(|message| SearchError::genotype(&self.name, &message))
    }

    /// Same kind and same concrete value.
    pub fn contains_same_value_as(&self, other: &Gene) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
            && self.to_json() == other.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_tree() -> Gene {
        Gene::object(
            "body",
            vec![
                Gene::integer_in("age", 0, 120),
                Gene::optional(Gene::string("nick", 0, 10)),
                Gene::nullable(Gene::date("born")),
                Gene::array("tags", Gene::enumeration("tag", ["a", "b", "c"]), 0, 4),
                Gene::choice("contact", vec![Gene::string("email", 3, 20), Gene::integer("phone")]),
            ],
        )
    }

    #[test]
    fn test_object_of_three_optional_leaves_weighs_six() {
        let gene = Gene::object(
            "o",
            vec![
                Gene::optional(Gene::integer("a")),
                Gene::optional(Gene::boolean("b")),
                Gene::optional(Gene::string("c", 0, 5)),
            ],
        );
        assert_eq!(gene.mutation_weight(), 6.0);
    }

    #[test]
    fn test_path_addressing() {
        let gene = sample_tree();
        let nick = gene.gene_at(&GenePath::from(vec![1, 0])).unwrap();
        assert_eq!(nick.name(), "nick");
        assert!(nick.is_leaf());
        assert!(gene.gene_at(&GenePath::from(vec![9])).is_none());
        let flat = gene.flat_view();
        assert_eq!(flat[0].0, GenePath::root());
        assert_eq!(flat[1].1.name(), "age");
        assert!(flat.iter().any(|(p, g)| p.steps() == [4, 1] && g.name() == "phone"));
    }

    #[test]
    fn test_inactive_optional_omitted_from_object() {
        let mut gene = sample_tree();
        if let GeneKind::Object(o) = &mut gene.kind {
            for field in &mut o.fields {
                if let GeneKind::Optional(opt) = &mut field.kind {
                    opt.active = false;
                }
            }
        }
        let json = gene.to_json();
        assert!(json.get("nick").is_none());
        assert_eq!(json.get("born"), Some(&Value::Null));
    }

    #[test]
    fn test_set_from_json_binds_nested_values() {
        let mut gene = sample_tree();
        gene.set_from_json(&serde_json::json!({
            "age": 30,
            "born": "1990-05-17",
            "tags": ["b", "c"],
            "contact": "me@example.org"
        }))
        .unwrap();
        let json = gene.to_json();
        assert_eq!(json["age"], 30);
        assert_eq!(json["born"], "1990-05-17");
        assert_eq!(json["tags"], serde_json::json!(["b", "c"]));
        assert_eq!(json["contact"], "me@example.org");
        assert!(json.get("nick").is_none());
    }

    #[test]
    fn test_set_from_json_error_leaves_gene_untouched() {
        let mut gene = sample_tree();
        let before = gene.clone();
        let err = gene.set_from_json(&serde_json::json!({"age": 500})).unwrap_err();
        assert!(matches!(err, SearchError::GenotypeError { .. }));
        assert_eq!(gene, before);
    }

    #[test]
    fn test_array_mutation_respects_bounds() {
        let mut rng = Randomness::with_seed(17);
        let mut gene = Gene::array("xs", Gene::integer_in("x", 0, 9), 1, 3);
        for _ in 0..300 {
            gene.mutate(&mut rng);
            assert!(gene.is_locally_valid());
        }
    }

    proptest! {
        #[test]
        fn prop_copy_is_independent(seed in any::<u64>()) {
            let mut rng = Randomness::with_seed(seed);
            let mut original = sample_tree();
            original.randomize(&mut rng, false);
            let mut copy = original.clone();
            prop_assert!(copy.contains_same_value_as(&original));
            let snapshot = original.to_json();
            for _ in 0..5 {
                copy.mutate(&mut rng);
            }
            prop_assert_eq!(original.to_json(), snapshot);
        }

        #[test]
        fn prop_printable_is_pure(seed in any::<u64>()) {
            let mut rng = Randomness::with_seed(seed);
            let mut gene = sample_tree();
            gene.randomize(&mut rng, false);
            prop_assert_eq!(gene.printable(), gene.printable());
        }

        #[test]
        fn prop_weight_is_sum_of_children(seed in any::<u64>()) {
            let mut rng = Randomness::with_seed(seed);
            let mut gene = sample_tree();
            gene.randomize(&mut rng, false);
            let children: f64 = gene.children().iter().map(|c| c.mutation_weight()).sum();
            prop_assert!((gene.mutation_weight() - children).abs() < 1e-9);
        }

        #[test]
        fn prop_mutation_keeps_validity(seed in any::<u64>()) {
            let mut rng = Randomness::with_seed(seed);
            let mut gene = sample_tree();
            gene.randomize(&mut rng, false);
            prop_assert!(gene.is_locally_valid());
            for _ in 0..10 {
                gene.mutate(&mut rng);
                prop_assert!(gene.is_locally_valid());
            }
        }

        #[test]
        fn prop_force_new_changes_value(seed in any::<u64>()) {
            let mut rng = Randomness::with_seed(seed);
            let mut gene = sample_tree();
            gene.randomize(&mut rng, false);
            let before = gene.to_json();
            gene.randomize(&mut rng, true);
            prop_assert_ne!(gene.to_json(), before);
        }
    }
}
