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

//! Actions and the catalog they are instantiated from.

use crate::errors::SearchError;
use crate::gene::Gene;
use crate::randomness::Randomness;
use crate::types::GeneId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a parameter's value is placed when the action is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Path,
    Query,
    Header,
    Body,
    Form,
    GraphQlArgument,
    RpcArgument,
    SqlColumn,
}

/// One parameter: owns exactly one top-level gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub gene: Gene,
}

impl Param {
    pub fn new(kind: ParamKind, gene: Gene) -> Self {
        Self {
            name: gene.name.clone(),
            kind,
            gene,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionCategory {
    /// Set-up executed before the main sequence (e.g. a SQL insertion).
    Environment,
    /// A call under test.
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphQlOperation {
    Query,
    Mutation,
}

/// How the action reaches the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transport {
    Rest { method: String, path: String },
    GraphQl { operation: GraphQlOperation, field: String },
    Rpc { interface: String, method: String },
    Sql { table: String },
}

/// A callable operation with its parameters.
///
/// Catalog entries are templates; sampling clones and randomizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub category: ActionCategory,
    pub transport: Transport,
    pub params: Vec<Param>,
    /// Resource this action creates, if any.
    pub produces: Option<String>,
    /// Resources that must have been created earlier in the sequence.
    pub requires: Vec<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, category: ActionCategory, transport: Transport) -> Self {
        Self {
            name: name.into(),
            category,
            transport,
            params: Vec::new(),
            produces: None,
            requires: Vec::new(),
        }
    }

    /// REST main action named `"<METHOD> <path>"`.
    pub fn rest(method: &str, path: &str) -> Self {
        let method = method.to_uppercase();
        Self::new(
            format!("{} {}", method, path),
            ActionCategory::Main,
            Transport::Rest {
                method,
                path: path.to_string(),
            },
        )
    }

    pub fn with_param(mut self, kind: ParamKind, gene: Gene) -> Self {
        self.params.push(Param::new(kind, gene));
        self
    }

    pub fn producing(mut self, resource: impl Into<String>) -> Self {
        self.produces = Some(resource.into());
        self
    }

    pub fn requiring(mut self, resource: impl Into<String>) -> Self {
        self.requires.push(resource.into());
        self
    }

    pub fn is_main(&self) -> bool {
        self.category == ActionCategory::Main
    }

    pub fn gene_id(&self, param_index: usize) -> Option<GeneId> {
        self.params.get(param_index).map(|p| GeneId::new(&self.name, &p.name))
    }

    pub fn gene_ids(&self) -> Vec<GeneId> {
        self.params.iter().map(|p| GeneId::new(&self.name, &p.name)).collect()
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn randomize(&mut self, rng: &mut Randomness) {
        for param in &mut self.params {
            param.gene.randomize(rng, false);
        }
    }

    pub fn is_locally_valid(&self) -> bool {
        self.params.iter().all(|p| p.gene.is_locally_valid())
    }

    /// Segments of the REST path, `{param}` placeholders replaced by the
    /// printable value of the path genes.
    ///
    /// Values are substituted after splitting, so a `/` inside a value stays
    /// within its segment. Segments are not percent-encoded.
    pub fn path_segments(&self) -> Option<Vec<String>> {
        let Transport::Rest { path, .. } = &self.transport else {
            return None;
        };
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Some(Vec::new());
        }
        let values: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|p| p.kind == ParamKind::Path)
            .map(|p| (format!("{{{}}}", p.name), p.gene.printable()))
            .collect();
        let segments = trimmed
            .split('/')
            .map(|segment| {
                values
                    .iter()
                    .fold(segment.to_string(), |acc, (placeholder, value)| acc.replace(placeholder, value))
            })
            .collect();
        Some(segments)
    }
}

/// The opaque, pre-validated set of callable actions, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionCatalog {
    actions: BTreeMap<String, Action>,
}

impl ActionCatalog {
    /// Fails with [`SearchError::ConfigError`] when there is no main action.
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Result<Self, SearchError> {
        let mut map = BTreeMap::new();
        for action in actions {
            if map.insert(action.name.clone(), action).is_some() {
                return Err(SearchError::ConfigError("duplicate action name in catalog".to_string()));
            }
        }
        let catalog = Self { actions: map };
        if catalog.main_actions().is_empty() {
            return Err(SearchError::ConfigError("action catalog has no main action".to_string()));
        }
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn main_actions(&self) -> Vec<&Action> {
        self.actions.values().filter(|a| a.is_main()).collect()
    }

    pub fn environment_actions(&self) -> Vec<&Action> {
        self.actions.values().filter(|a| !a.is_main()).collect()
    }

    /// Main actions that create `resource`, in name order.
    pub fn producers_of(&self, resource: &str) -> Vec<&Action> {
        self.actions
            .values()
            .filter(|a| a.is_main() && a.produces.as_deref() == Some(resource))
            .collect()
    }

    /// A fresh, randomized copy of a uniformly chosen main action.
    pub fn sample_main(&self, rng: &mut Randomness) -> Result<Action, SearchError> {
        let mains = self.main_actions();
        let template = rng
            .choose(&mains)
            .ok_or_else(|| SearchError::ConfigError("action catalog has no main action".to_string()))?;
        let mut action = (*template).clone();
        action.randomize(rng);
        Ok(action)
    }
}
