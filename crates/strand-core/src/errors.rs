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

//! Defines common error types for the Strand search core.

use thiserror::Error;

/// The primary error type for search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Invalid configuration, empty action catalog or invalid budget. Fatal at startup.
    #[error("Configuration Error: {0}")]
    ConfigError(String),

    /// The controller could not be reached after the allowed retries.
    #[error("Connection to controller lost: {0}")]
    ConnectionLost(String),

    /// A single action failed (timeout, malformed response, unexpected status).
    #[error("Action Execution Failed ({action}): {reason}")]
    ActionFailed {
        /// Name of the action that failed.
        action: String,
        /// What went wrong.
        reason: String,
    },

    /// A gene could not be brought back to a locally valid state.
    #[error("Genotype Error ({gene}): {message}")]
    GenotypeError {
        /// Name of the offending gene.
        gene: String,
        /// Specific failure message.
        message: String,
    },

    /// An action sequence violates ordering invariants and repair failed.
    #[error("Structural Error: {0}")]
    StructuralError(String),

    /// Error during serialization or deserialization (e.g., JSON parsing).
    #[error("Serialization/Deserialization Error: {0}")]
    SerdeError(#[from] serde_json::Error),

    /// Represents an unexpected internal error.
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl SearchError {
    /// Creates a new genotype error.
    pub fn genotype(gene: &str, message: &str) -> Self {
        SearchError::GenotypeError {
            gene: gene.to_string(),
            message: message.to_string(),
        }
    }

    /// Creates a new action failure.
    pub fn action_failed(action: &str, reason: impl Into<String>) -> Self {
        SearchError::ActionFailed {
            action: action.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error must stop the whole search.
    ///
    /// Configuration faults and lost connections are fatal; everything else is
    /// recorded in the run statistics and the search carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SearchError::ConfigError(_) | SearchError::ConnectionLost(_) | SearchError::InternalError(_)
        )
    }
}
