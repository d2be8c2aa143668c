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

//! Wire types of the controller protocol (JSON, camelCase).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope of every controller response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedResponseDto<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProblemType {
    Rest,
    Graphql,
    Rpc,
}

/// Static description of the system under test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SutInfoDto {
    pub base_url_of_sut: Option<String>,
    pub problem_type: Option<ProblemType>,
    /// Path of the GraphQL endpoint, relative to the base URL.
    pub graphql_endpoint: Option<String>,
    pub default_output_format: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerInfoDto {
    pub full_name: Option<String>,
    pub is_instrumentation_on: bool,
}

/// Body of `PUT /runSUT`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SutRunDto {
    pub run: bool,
    pub reset_state: bool,
    pub calculate_sql_heuristics: bool,
}

/// An action about to run (registration), or to be run by the controller
/// itself when `parameters` is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionDto {
    pub index: usize,
    pub name: Option<String>,
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActionResponseDto {
    pub index: usize,
    pub status_code: Option<u16>,
    pub response: Option<Value>,
    pub error: Option<String>,
}

/// Heuristic of one target, as reported since the last reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetInfoDto {
    pub id: i32,
    pub descriptive_id: Option<String>,
    pub value: f64,
    /// Index of the action that reached `value`, negative when unknown.
    pub action_index: i32,
}

/// What the instrumentation discovered while an action ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdditionalInfoDto {
    pub query_parameters: Vec<String>,
    pub headers: Vec<String>,
    pub last_executed_statement: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeuristicEntryDto {
    #[serde(rename = "type")]
    pub kind: String,
    pub objective: String,
    pub id: Option<String>,
    /// Distance, `0` meaning satisfied.
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtraHeuristicsDto {
    pub heuristics: Vec<HeuristicEntryDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestResultsDto {
    pub targets: Vec<TargetInfoDto>,
    pub additional_info_list: Vec<AdditionalInfoDto>,
    pub extra_heuristics: Vec<ExtraHeuristicsDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_results_from_wire() {
        let wire = json!({
            "data": {
                "targets": [
                    {"id": 3, "descriptiveId": "Line_at_Foo_00012", "value": 0.5, "actionIndex": 1}
                ],
                "extraHeuristics": [
                    {"heuristics": [{"type": "SQL", "objective": "MINIMIZE_TO_ZERO", "value": 2.0}]}
                ]
            }
        });
        let dto: WrappedResponseDto<TestResultsDto> = serde_json::from_value(wire).unwrap();
        let results = dto.data.unwrap();
        assert_eq!(results.targets[0].descriptive_id.as_deref(), Some("Line_at_Foo_00012"));
        assert_eq!(results.targets[0].action_index, 1);
        assert_eq!(results.extra_heuristics[0].heuristics[0].kind, "SQL");
        assert!(results.additional_info_list.is_empty());
        assert!(dto.error.is_none());
    }

    #[test]
    fn test_error_envelope_without_data() {
        let dto: WrappedResponseDto<SutInfoDto> = serde_json::from_str(r#"{"error":"SUT not started"}"#).unwrap();
        assert!(dto.data.is_none());
        assert_eq!(dto.error.as_deref(), Some("SUT not started"));
    }

    #[test]
    fn test_run_dto_is_camel_case() {
        let body = serde_json::to_value(SutRunDto {
            run: true,
            reset_state: true,
            calculate_sql_heuristics: false,
        })
        .unwrap();
        assert_eq!(body, json!({"run": true, "resetState": true, "calculateSqlHeuristics": false}));
    }
}
