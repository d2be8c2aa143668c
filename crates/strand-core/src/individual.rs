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

//! Test cases: environment actions followed by the main sequence.

use crate::action::{Action, ActionCatalog};
use crate::errors::SearchError;
use crate::randomness::Randomness;
use crate::types::GeneId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// How an individual came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleOrigin {
    Random,
    Seeded,
    Mutated,
}

/// Which list of an individual an action lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Section {
    Environment,
    Main,
}

/// Position of a top-level parameter gene inside an individual.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneAddress {
    pub section: Section,
    pub action: usize,
    pub param: usize,
}

/// One candidate test case. Cloning deep-copies every gene tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    pub env_actions: Vec<Action>,
    pub main_actions: Vec<Action>,
    pub origin: SampleOrigin,
}

impl Individual {
    pub fn new(env_actions: Vec<Action>, main_actions: Vec<Action>, origin: SampleOrigin) -> Self {
        Self {
            env_actions,
            main_actions,
            origin,
        }
    }

    /// Number of main actions. This is the "length" used by archive tie-breaks.
    pub fn size(&self) -> usize {
        self.main_actions.len()
    }

    /// Environment actions first, then the main sequence.
    pub fn all_actions(&self) -> impl Iterator<Item = &Action> {
        self.env_actions.iter().chain(self.main_actions.iter())
    }

    pub fn action(&self, section: Section, index: usize) -> Option<&Action> {
        match section {
            Section::Environment => self.env_actions.get(index),
            Section::Main => self.main_actions.get(index),
        }
    }

    pub fn action_mut(&mut self, section: Section, index: usize) -> Option<&mut Action> {
        match section {
            Section::Environment => self.env_actions.get_mut(index),
            Section::Main => self.main_actions.get_mut(index),
        }
    }

    /// Every top-level gene, in execution order.
    pub fn gene_addresses(&self) -> Vec<GeneAddress> {
        let mut out = Vec::new();
        for (section, actions) in [(Section::Environment, &self.env_actions), (Section::Main, &self.main_actions)] {
            for (a, action) in actions.iter().enumerate() {
                for p in 0..action.params.len() {
                    out.push(GeneAddress {
                        section,
                        action: a,
                        param: p,
                    });
                }
            }
        }
        out
    }

    pub fn gene_id(&self, address: &GeneAddress) -> Option<GeneId> {
        self.action(address.section, address.action)?.gene_id(address.param)
    }

    /// Main action names with their multiplicity.
    pub fn action_name_multiset(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for action in &self.main_actions {
            *counts.entry(action.name.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Stable digest of the action names and all gene values.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for action in self.all_actions() {
            hasher.update(action.name.as_bytes());
            hasher.update([0u8]);
            for param in &action.params {
                hasher.update(param.name.as_bytes());
                hasher.update([b'=']);
                hasher.update(param.gene.to_json().to_string().as_bytes());
                hasher.update([0u8]);
            }
            hasher.update([b'\n']);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn is_locally_valid(&self) -> bool {
        self.all_actions().all(Action::is_locally_valid)
    }

    /// Checks size bounds and that every requirement of a main action is
    /// produced by an environment action or an earlier main action.
    pub fn verify_structure(&self, max_test_size: usize) -> Result<(), SearchError> {
        if self.main_actions.is_empty() {
            return Err(SearchError::StructuralError("no main action".to_string()));
        }
        if self.main_actions.len() > max_test_size {
            return Err(SearchError::StructuralError(format!(
                "{} main actions exceed the limit of {}",
                self.main_actions.len(),
                max_test_size
            )));
        }
        let mut produced = self.env_resources();
        for (i, action) in self.main_actions.iter().enumerate() {
            if let Some(missing) = action.requires.iter().find(|r| !produced.contains(r.as_str())) {
                return Err(SearchError::StructuralError(format!(
                    "action {} ({}) requires '{}' before it is created",
                    i, action.name, missing
                )));
            }
            if let Some(resource) = &action.produces {
                produced.insert(resource.clone());
            }
        }
        Ok(())
    }

    fn env_resources(&self) -> BTreeSet<String> {
        self.env_actions.iter().filter_map(|a| a.produces.clone()).collect()
    }

    /// Restores ordering invariants by inserting producers in front of
    /// consumers, then trims the sequence to `max_test_size`.
    ///
    /// Returns how many actions were inserted. Fails when a required resource
    /// has no producer in the catalog or the insertion budget runs out.
    pub fn repair(
        &mut self,
        catalog: &ActionCatalog,
        rng: &mut Randomness,
        max_test_size: usize,
    ) -> Result<usize, SearchError> {
        let budget = max_test_size.max(1) * 2;
        let mut produced = self.env_resources();
        let mut inserted = 0;
        let mut i = 0;
        while i < self.main_actions.len() {
            let missing = self.main_actions[i]
                .requires
                .iter()
                .find(|r| !produced.contains(r.as_str()))
                .cloned();
            match missing {
                Some(resource) => {
                    if inserted >= budget {
                        return Err(SearchError::StructuralError(format!(
                            "could not satisfy '{}' within {} insertions",
                            resource, budget
                        )));
                    }
                    let producers = catalog.producers_of(&resource);
                    let template = rng.choose(&producers).ok_or_else(|| {
                        SearchError::StructuralError(format!("no action produces '{}'", resource))
                    })?;
                    let mut producer = (*template).clone();
                    producer.randomize(rng);
                    self.main_actions.insert(i, producer);
                    inserted += 1;
                }
                None => {
                    if let Some(resource) = &self.main_actions[i].produces {
                        produced.insert(resource.clone());
                    }
                    i += 1;
                }
            }
        }
        // a prefix of a valid sequence stays valid
        self.main_actions.truncate(max_test_size);
        self.verify_structure(max_test_size)?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionCategory, ParamKind, Transport};
    use crate::gene::Gene;

    fn catalog() -> ActionCatalog {
        ActionCatalog::new(vec![
            Action::rest("POST", "/users").producing("user"),
            Action::rest("POST", "/users/{id}/orders")
                .with_param(ParamKind::Path, Gene::integer("id"))
                .requiring("user")
                .producing("order"),
            Action::rest("GET", "/orders/{oid}")
                .with_param(ParamKind::Path, Gene::integer("oid"))
                .requiring("order"),
            Action::rest("GET", "/ghosts").requiring("ghost"),
        ])
        .unwrap()
    }

    #[test]
    fn test_repair_inserts_transitive_producers() {
        let catalog = catalog();
        let mut rng = Randomness::with_seed(1);
        let mut ind = Individual::new(
            vec![],
            vec![catalog.get("GET /orders/{oid}").unwrap().clone()],
            SampleOrigin::Random,
        );
        assert!(ind.verify_structure(10).is_err());
        let inserted = ind.repair(&catalog, &mut rng, 10).unwrap();
        assert_eq!(inserted, 2);
        let names: Vec<&str> = ind.main_actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["POST /users", "POST /users/{id}/orders", "GET /orders/{oid}"]);
        assert!(ind.verify_structure(10).is_ok());
    }

    #[test]
    fn test_repair_fails_without_producer() {
        let catalog = catalog();
        let mut rng = Randomness::with_seed(1);
        let mut ind = Individual::new(vec![], vec![catalog.get("GET /ghosts").unwrap().clone()], SampleOrigin::Random);
        assert!(matches!(
            ind.repair(&catalog, &mut rng, 10),
            Err(SearchError::StructuralError(_))
        ));
    }

    #[test]
    fn test_repair_trims_to_limit() {
        let catalog = catalog();
        let mut rng = Randomness::with_seed(1);
        let post = catalog.get("POST /users").unwrap().clone();
        let mut ind = Individual::new(vec![], vec![post; 6], SampleOrigin::Random);
        ind.repair(&catalog, &mut rng, 4).unwrap();
        assert_eq!(ind.size(), 4);
    }

    #[test]
    fn test_env_actions_provide_resources() {
        let mut seed_user = Action::new("INSERT users", ActionCategory::Environment, Transport::Sql { table: "users".into() });
        seed_user.produces = Some("user".into());
        let catalog = catalog();
        let ind = Individual::new(
            vec![seed_user],
            vec![catalog.get("POST /users/{id}/orders").unwrap().clone()],
            SampleOrigin::Random,
        );
        assert!(ind.verify_structure(10).is_ok());
    }

    #[test]
    fn test_fingerprint_tracks_values() {
        let catalog = catalog();
        let action = catalog.get("GET /orders/{oid}").unwrap().clone();
        let a = Individual::new(vec![], vec![action.clone()], SampleOrigin::Random);
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.main_actions[0].params[0].gene.set_from_json(&serde_json::json!(99)).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_multiset_and_addresses() {
        let catalog = catalog();
        let get = catalog.get("GET /orders/{oid}").unwrap().clone();
        let post = catalog.get("POST /users").unwrap().clone();
        let ind = Individual::new(vec![], vec![get.clone(), post, get], SampleOrigin::Random);
        let multiset = ind.action_name_multiset();
        assert_eq!(multiset.get("GET /orders/{oid}"), Some(&2));
        assert_eq!(ind.gene_addresses().len(), 2);
        let id = ind.gene_id(&ind.gene_addresses()[1]).unwrap();
        assert_eq!(id.as_str(), "GET /orders/{oid}::oid");
    }
}
