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

use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use strand_core::test_utils::items_catalog;
use strand_core::{Action, ActionStatus, FitnessFunction, Gene, Individual, ParamKind, SampleOrigin, SearchConfig, SearchError, TargetId};
use strand_remote::dto::{ActionDto, ProblemType};
use strand_remote::{ActionExecutor, HttpRemoteController, RemoteController, RemoteError, RemoteFitnessFunction, RestExecutor};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> SearchConfig {
    SearchConfig {
        controller_retry_attempts: 2,
        controller_retry_backoff_ms: 1,
        action_timeout_ms: 2_000,
        ..SearchConfig::default()
    }
}

async fn mock_ok(server: &MockServer, verb: &str, endpoint: &str) {
    Mock::given(method(verb))
        .and(path(format!("/controller/api/{}", endpoint)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
        .mount(server)
        .await;
}

/// Controller of a REST system served by `sut`, reporting one covered line.
async fn rest_controller(sut: &MockServer) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/controller/api/infoSUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"baseUrlOfSut": sut.uri(), "problemType": "REST"}
        })))
        .mount(&server)
        .await;
    mock_ok(&server, "PUT", "runSUT").await;
    mock_ok(&server, "POST", "newSearch").await;
    mock_ok(&server, "PUT", "newAction").await;
    Mock::given(method("GET"))
        .and(path("/controller/api/testResults"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"targets": [{"id": 0, "descriptiveId": "Line_at_ItemsApi_00010", "value": 1.0, "actionIndex": 0}]}
        })))
        .mount(&server)
        .await;
    server
}

fn list_items() -> Individual {
    let mut action = items_catalog().get("GET /items").unwrap().clone();
    action.params[0].gene.set_from_json(&serde_json::Value::Null).unwrap();
    Individual::new(vec![], vec![action], SampleOrigin::Random)
}

async fn slow_sut() -> MockServer {
    let sut = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&sut)
        .await;
    sut
}

#[tokio::test]
async fn reads_sut_info_from_the_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/controller/api/infoSUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"baseUrlOfSut": "http://localhost:8080", "problemType": "REST"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let controller = HttpRemoteController::new(&server.uri(), &config()).unwrap();
    let info = controller.get_sut_info().await.unwrap();
    assert_eq!(info.base_url_of_sut.as_deref(), Some("http://localhost:8080"));
    assert_eq!(info.problem_type, Some(ProblemType::Rest));
}

#[tokio::test]
async fn controller_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/controller/api/controllerInfo"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "boom" })))
        .mount(&server)
        .await;

    let controller = HttpRemoteController::new(&server.uri(), &config()).unwrap();
    let err = controller.get_controller_info().await.unwrap_err();
    assert!(matches!(err, RemoteError::ControllerError(ref m) if m.contains("boom")));
    let err: SearchError = err.into();
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn lifecycle_calls_send_the_expected_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/controller/api/runSUT"))
        .and(body_json(json!({"run": true, "resetState": true, "calculateSqlHeuristics": false})))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/controller/api/newSearch"))
        .and(body_json(json!({"newSearch": true})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/controller/api/newAction"))
        .and(body_json(json!({"index": 3, "name": "GET /items", "parameters": null})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let controller = HttpRemoteController::new(&server.uri(), &config()).unwrap();
    controller.start_sut().await.unwrap();
    controller.reset_sut().await.unwrap();
    controller.start_new_search().await.unwrap();
    controller
        .register_new_action(&ActionDto {
            index: 3,
            name: Some("GET /items".to_string()),
            parameters: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_results_are_queried_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/controller/api/testResults"))
        .and(query_param("ids", "1,4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"targets": [{"id": 4, "value": 0.5, "actionIndex": 0}]}
        })))
        .mount(&server)
        .await;

    let controller = HttpRemoteController::new(&server.uri(), &config()).unwrap();
    let results = controller.get_test_results(&BTreeSet::from([4, 1])).await.unwrap();
    assert_eq!(results.targets.len(), 1);
    assert_eq!(results.targets[0].value, 0.5);
}

#[tokio::test]
async fn unreachable_controller_is_fatal_after_retries() {
    // Nothing listens on the port once the listener is dropped.
    let address = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let controller = HttpRemoteController::new(&address, &config()).unwrap();
    let err = controller.get_sut_info().await.unwrap_err();
    assert!(matches!(err, RemoteError::Unreachable { attempts: 2, .. }));
    assert!(SearchError::from(err).is_fatal());
}

#[tokio::test]
async fn rest_evaluation_drives_sut_and_controller() {
    let sut = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&sut)
        .await;

    let server = rest_controller(&sut).await;
    let controller: Arc<dyn RemoteController> = Arc::new(HttpRemoteController::new(&server.uri(), &config()).unwrap());
    let mut fitness = RemoteFitnessFunction::connect(controller, &config()).await.unwrap();

    let evaluated = fitness.evaluate(&list_items()).await.unwrap();
    assert_eq!(evaluated.results[0].status_code, Some(200));
    assert!(evaluated.fitness.covers(&TargetId::from("Line_at_ItemsApi_00010")));
    assert_eq!(fitness.consecutive_failures(), 0);
}

#[tokio::test]
async fn reserved_characters_in_path_values_are_encoded() {
    let sut = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/items/a%2Fb%3Fc%23d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a/b?c#d"})))
        .expect(1)
        .mount(&sut)
        .await;

    let executor = RestExecutor::new(reqwest::Client::new(), &sut.uri()).unwrap();
    let mut action = Action::rest("GET", "/items/{id}").with_param(ParamKind::Path, Gene::string("id", 0, 10));
    action.params[0].gene.set_from_json(&json!("a/b?c#d")).unwrap();

    let outcome = executor.execute(&action, 0).await.unwrap();
    assert_eq!(outcome.status_code, Some(200));
    assert_eq!(outcome.body, Some(json!({"id": "a/b?c#d"})));
}

#[tokio::test]
async fn slow_rest_action_is_timed_out() {
    let sut = slow_sut().await;
    let server = rest_controller(&sut).await;
    let config = SearchConfig {
        action_timeout_ms: 200,
        ..config()
    };
    let controller: Arc<dyn RemoteController> = Arc::new(HttpRemoteController::new(&server.uri(), &config).unwrap());
    let mut fitness = RemoteFitnessFunction::connect(controller, &config).await.unwrap();

    let evaluated = fitness.evaluate(&list_items()).await.unwrap();
    assert_eq!(evaluated.results[0].status, ActionStatus::TimedOut);
    assert_eq!(evaluated.timed_out_actions(), 1);
}

#[tokio::test]
async fn client_timeout_counts_as_timed_out() {
    let sut = slow_sut().await;
    let server = rest_controller(&sut).await;
    let controller: Arc<dyn RemoteController> = Arc::new(HttpRemoteController::new(&server.uri(), &config()).unwrap());
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let executor = RestExecutor::new(client, &sut.uri()).unwrap();
    let mut fitness = RemoteFitnessFunction::new(controller, Box::new(executor), &config());

    let evaluated = fitness.evaluate(&list_items()).await.unwrap();
    assert_eq!(evaluated.results[0].status, ActionStatus::TimedOut);
}
