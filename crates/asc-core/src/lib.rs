// SPDX-License-Identifier: MIT OR Apache-2.0
//! Core domain types for the answerscope pipeline.
//!
//! This crate holds the entity records shared by every other crate —
//! campaigns, topics, personas, questions, runs, run items, responses,
//! exports and deliveries — together with their status state machines,
//! the content-addressed work-unit fingerprint, and the flat record
//! shape produced by the export composer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod entity;
pub mod fingerprint;
pub mod record;
pub mod status;

pub use entity::{
    Campaign, Delivery, Export, ExportFormat, Persona, ProviderSpec, Question, Response, Run,
    RunItem, RunSpec, Topic, merge_settings, new_id,
};
pub use fingerprint::{canonical_json, fingerprint, normalize_question_text};
pub use record::{ExportRecord, ResponseFields, TokenUsage};
pub use status::{DeliveryStatus, ExportStatus, ItemStatus, RunStatus, RunStatusCounts};
