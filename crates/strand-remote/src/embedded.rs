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

//! A controller living in the same process as the system under test.
//!
//! The system under test is a handler that receives every action run by the
//! controller together with the tracer it reports heuristics to.

use crate::controller::RemoteController;
use crate::dto::{ActionDto, ActionResponseDto, ControllerInfoDto, SutInfoDto, TestResultsDto};
use crate::errors::RemoteError;
use crate::tracer::ExecutionTracer;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub type SharedTracer = Arc<Mutex<ExecutionTracer>>;

/// Handler standing in for the system under test.
pub type ActionHandler =
    Box<dyn Fn(ActionDto, SharedTracer) -> BoxFuture<'static, Result<ActionResponseDto, RemoteError>> + Send + Sync>;

pub struct EmbeddedController {
    info: SutInfoDto,
    tracer: SharedTracer,
    handler: ActionHandler,
    running: Mutex<bool>,
}

impl EmbeddedController {
    pub fn new(info: SutInfoDto, handler: ActionHandler) -> Self {
        Self {
            info,
            tracer: Arc::new(Mutex::new(ExecutionTracer::new())),
            handler,
            running: Mutex::new(false),
        }
    }

    pub fn tracer(&self) -> SharedTracer {
        Arc::clone(&self.tracer)
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }
}

#[async_trait]
impl RemoteController for EmbeddedController {
    async fn get_sut_info(&self) -> Result<SutInfoDto, RemoteError> {
        Ok(self.info.clone())
    }

    async fn get_controller_info(&self) -> Result<ControllerInfoDto, RemoteError> {
        Ok(ControllerInfoDto {
            full_name: Some("embedded".to_string()),
            is_instrumentation_on: true,
        })
    }

    async fn start_sut(&self) -> Result<(), RemoteError> {
        *self.running.lock().await = true;
        self.tracer.lock().await.reset();
        info!("Embedded SUT started");
        Ok(())
    }

    async fn stop_sut(&self) -> Result<(), RemoteError> {
        *self.running.lock().await = false;
        info!("Embedded SUT stopped");
        Ok(())
    }

    async fn reset_sut(&self) -> Result<(), RemoteError> {
        self.start_sut().await
    }

    async fn start_new_search(&self) -> Result<(), RemoteError> {
        self.tracer.lock().await.reset_search();
        Ok(())
    }

    async fn register_new_action(&self, action: &ActionDto) -> Result<(), RemoteError> {
        debug!("Action {} registered", action.index);
        self.tracer.lock().await.set_action(action.index);
        Ok(())
    }

    async fn execute_action(&self, action: &ActionDto) -> Result<ActionResponseDto, RemoteError> {
        if !self.is_running().await {
            return Err(RemoteError::ControllerError("SUT is not running".to_string()));
        }
        (self.handler)(action.clone(), self.tracer()).await
    }

    async fn get_test_results(&self, ids: &BTreeSet<i32>) -> Result<TestResultsDto, RemoteError> {
        Ok(self.tracer.lock().await.snapshot(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn echo() -> ActionHandler {
        Box::new(|action: ActionDto, tracer: SharedTracer| {
            async move {
                tracer.lock().await.update_objective("echo", 1.0);
                Ok(ActionResponseDto {
                    index: action.index,
                    status_code: Some(200),
                    response: action.parameters,
                    error: None,
                })
            }
            .boxed()
        })
    }

    #[test]
    fn test_controller_info() {
        let controller = EmbeddedController::new(SutInfoDto::default(), echo());
        let info = tokio_test::assert_ok!(tokio_test::block_on(controller.get_controller_info()));
        assert!(info.is_instrumentation_on);
        assert!(!tokio_test::block_on(controller.is_running()));
    }

    #[tokio::test]
    async fn test_actions_need_a_running_sut() {
        let controller = EmbeddedController::new(SutInfoDto::default(), echo());
        let action = ActionDto {
            index: 0,
            ..ActionDto::default()
        };
        assert!(controller.execute_action(&action).await.is_err());

        controller.start_sut().await.unwrap();
        controller.register_new_action(&action).await.unwrap();
        let response = controller.execute_action(&action).await.unwrap();
        assert_eq!(response.status_code, Some(200));

        let results = controller.get_test_results(&BTreeSet::new()).await.unwrap();
        assert_eq!(results.targets[0].action_index, 0);

        controller.reset_sut().await.unwrap();
        assert!(controller.get_test_results(&BTreeSet::new()).await.unwrap().targets.is_empty());
    }
}
