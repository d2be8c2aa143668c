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

//! Error types for controller communication

use strand_core::SearchError;
use thiserror::Error;

/// Errors raised while talking to the controller or the system under test
#[derive(Error, Debug)]
pub enum RemoteError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Malformed controller or SUT address
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    /// The controller answered with an error or an unexpected status
    #[error("Controller error: {0}")]
    ControllerError(String),

    /// The controller could not be reached within the retry budget
    #[error("Controller unreachable after {attempts} attempts: {reason}")]
    Unreachable { attempts: u32, reason: String },

    /// A single action did not complete in time
    #[error("Action timed out after {0} ms")]
    Timeout(u64),

    /// A single action could not be executed
    #[error("Action execution failed: {0}")]
    ActionError(String),
}

impl RemoteError {
    /// Connection-level faults: worth retrying, and fatal once retries run out.
    pub fn is_connection_fault(&self) -> bool {
        match self {
            RemoteError::HttpError(e) => e.is_connect() || e.is_timeout(),
            RemoteError::Unreachable { .. } => true,
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            RemoteError::HttpError(e) => e.is_timeout(),
            RemoteError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<RemoteError> for SearchError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unreachable { .. } => SearchError::ConnectionLost(err.to_string()),
            RemoteError::UrlError(e) => SearchError::ConfigError(format!("invalid controller address: {}", e)),
            RemoteError::JsonError(e) => SearchError::SerdeError(e),
            RemoteError::Timeout(ms) => SearchError::action_failed("controller", format!("timed out after {} ms", ms)),
            other => SearchError::action_failed("controller", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_is_fatal() {
        let err: SearchError = RemoteError::Unreachable {
            attempts: 3,
            reason: "connection refused".into(),
        }
        .into();
        assert!(matches!(err, SearchError::ConnectionLost(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_controller_error_is_not_fatal() {
        let err: SearchError = RemoteError::ControllerError("500".into()).into();
        assert!(!err.is_fatal());
        assert!(!RemoteError::Timeout(10).is_connection_fault());
        assert!(RemoteError::Timeout(10).is_timeout());
        assert!(!RemoteError::ActionError("bad".into()).is_timeout());
    }

    #[test]
    fn test_bad_url_is_config_error() {
        let parse = url::Url::parse("not a url").unwrap_err();
        let err: SearchError = RemoteError::from(parse).into();
        assert!(matches!(err, SearchError::ConfigError(_)));
    }
}
