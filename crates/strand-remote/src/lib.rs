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

#![deny(unsafe_code)]

//! Remote evaluation for Strand: the controller protocol over HTTP+JSON,
//! executors for REST, GraphQL and RPC actions, and a fitness function
//! driving them.

pub mod controller;
pub mod dto;
pub mod embedded;
pub mod errors;
pub mod executor;
pub mod fitness;
pub mod tracer;

pub use controller::{HttpRemoteController, RemoteController, BASE_PATH};
pub use embedded::{ActionHandler, EmbeddedController, SharedTracer};
pub use errors::RemoteError;
pub use executor::{ActionExecutor, ActionOutcome, ControllerExecutor, GraphQlExecutor, RestExecutor};
pub use fitness::RemoteFitnessFunction;
pub use tracer::ExecutionTracer;
