// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP control surface for the answerscope pipeline.
//!
//! Thin CRUD and lifecycle endpoints over the pipeline entities; all
//! routes except `/health` require a configured `x-api-key`. Admission
//! is the only layer that returns user-visible errors synchronously —
//! everything downstream settles through the state machines.

#![deny(unsafe_code)]

mod api;
mod error;
mod middleware;

pub use api::build_app;
pub use error::ApiError;

use asc_runtime::EngineContext;
use std::sync::Arc;

/// Shared application state handed to every handler.
pub type AppState = Arc<EngineContext>;
