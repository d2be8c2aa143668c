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

//! Common type definitions used throughout Strand.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier of one coverage/behaviour objective
/// (a branch, a line, a fault signature, a SQL heuristic, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(String);

impl TargetId {
    /// Creates a new TargetId from a string-like type.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the descriptive id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TargetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a gene inside a gene tree: the child indices walked from the root.
///
/// An empty path designates the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenePath(Vec<usize>);

impl GenePath {
    /// Path of the root gene.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of the `index`-th child of this path.
    pub fn child(&self, index: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(index);
        Self(steps)
    }

    /// The child indices, root first.
    pub fn steps(&self) -> &[usize] {
        &self.0
    }

    /// Number of steps from the root.
    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<usize>> for GenePath {
    fn from(steps: Vec<usize>) -> Self {
        Self(steps)
    }
}

impl fmt::Display for GenePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|i| i.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

/// Stable identifier of a top-level parameter gene, independent of the action's
/// position in the sequence: `<action name>::<parameter name>`.
///
/// Impact statistics are keyed by it so they survive structural mutation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneId(String);

impl GeneId {
    /// Separator between action and gene names.
    pub const SEPARATOR: &'static str = "::";

    /// Builds the id of parameter `param` of action `action`.
    pub fn new(action: &str, param: &str) -> Self {
        Self(format!("{}{}{}", action, Self::SEPARATOR, param))
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeneId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
