// SPDX-License-Identifier: MIT OR Apache-2.0
//! System-of-record store for the answerscope pipeline.
//!
//! [`Store`] is the fixed seam between the pipeline and its relational
//! backing; [`MemoryStore`] is the shipped implementation. Writes are
//! short and per-entity (no transaction spans a provider call), and the
//! fingerprint uniqueness invariant is enforced here: inserting a run item
//! whose fingerprint already exists anywhere is a silent skip.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod memory;

pub use memory::MemoryStore;

use asc_core::{
    Campaign, Delivery, DeliveryStatus, Export, ItemStatus, Persona, Question, Response, Run,
    RunItem, RunStatusCounts, Topic,
};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Errors surfaced by [`Store`] operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced entity does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Entity kind, e.g. `"run"`.
        entity: &'static str,
        /// Identifier that missed.
        id: String,
    },

    /// A uniqueness constraint was violated.
    #[error("conflict: {reason}")]
    Conflict {
        /// Human-readable description of the constraint.
        reason: String,
    },
}

impl StoreError {
    /// Shorthand for a [`StoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Convenience alias used throughout the store API.
pub type StoreResult<T> = Result<T, StoreError>;

/// Page of run items plus the unpaginated total.
#[derive(Debug, Clone)]
pub struct ItemPage {
    /// Items in `(created_at, id)` order.
    pub items: Vec<RunItem>,
    /// Total matching items before pagination.
    pub total: usize,
}

/// The system of record for every pipeline entity.
///
/// Implementations must keep each method atomic with respect to the
/// entities it touches; callers never hold transactions across calls.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Campaigns -------------------------------------------------------

    /// Insert a campaign. Names are unique.
    async fn create_campaign(&self, campaign: Campaign) -> StoreResult<()>;
    /// Fetch a campaign by id.
    async fn get_campaign(&self, id: &str) -> StoreResult<Campaign>;
    /// Look a campaign up by its unique name.
    async fn find_campaign_by_name(&self, name: &str) -> StoreResult<Option<Campaign>>;
    /// All campaigns, in creation order.
    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>>;

    // -- Topics ----------------------------------------------------------

    /// Insert a topic.
    async fn create_topic(&self, topic: Topic) -> StoreResult<()>;
    /// Fetch a topic by id.
    async fn get_topic(&self, id: &str) -> StoreResult<Topic>;
    /// Look a topic up by `(campaign, title)`.
    async fn find_topic(&self, campaign_id: &str, title: &str) -> StoreResult<Option<Topic>>;

    // -- Personas --------------------------------------------------------

    /// Insert a persona.
    async fn create_persona(&self, persona: Persona) -> StoreResult<()>;
    /// Fetch a persona by id.
    async fn get_persona(&self, id: &str) -> StoreResult<Persona>;
    /// Look a persona up by its unique name.
    async fn find_persona_by_name(&self, name: &str) -> StoreResult<Option<Persona>>;

    // -- Questions -------------------------------------------------------

    /// Insert a question.
    async fn create_question(&self, question: Question) -> StoreResult<()>;
    /// Fetch a question by id.
    async fn get_question(&self, id: &str) -> StoreResult<Question>;
    /// Look a question up by `(topic, metadata.external_id)`.
    async fn find_question_by_external_id(
        &self,
        topic_id: &str,
        external_id: &str,
    ) -> StoreResult<Option<Question>>;
    /// Every question belonging to the campaign (via its topics), in
    /// creation order.
    async fn questions_for_campaign(&self, campaign_id: &str) -> StoreResult<Vec<Question>>;

    // -- Runs ------------------------------------------------------------

    /// Insert a run.
    async fn create_run(&self, run: Run) -> StoreResult<()>;
    /// Fetch a run by id.
    async fn get_run(&self, id: &str) -> StoreResult<Run>;
    /// Replace a run row (rollups are last-writer-wins by design).
    async fn put_run(&self, run: Run) -> StoreResult<()>;

    // -- Run items -------------------------------------------------------

    /// Insert a run item unless its fingerprint already exists anywhere.
    /// Returns `true` when inserted, `false` on the silent duplicate skip.
    async fn insert_item_if_absent(&self, item: RunItem) -> StoreResult<bool>;
    /// Fetch a run item by id.
    async fn get_item(&self, id: &str) -> StoreResult<RunItem>;
    /// Atomically claim an item for execution: `pending → running` with an
    /// attempt-count increment. With `retry` set, `failed` items are also
    /// admitted. Returns `None` when the item is not claimable (the
    /// state-machine safety net behind the single-consumer queue).
    async fn claim_item(&self, id: &str, retry: bool) -> StoreResult<Option<RunItem>>;
    /// Replace a run item row.
    async fn put_item(&self, item: RunItem) -> StoreResult<()>;
    /// Page through a run's items in `(created_at, id)` order.
    async fn items_for_run(
        &self,
        run_id: &str,
        status: Option<ItemStatus>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<ItemPage>;
    /// Per-status counts over the run's items.
    async fn status_counts(&self, run_id: &str) -> StoreResult<RunStatusCounts>;
    /// Up to `limit` distinct item errors for the run.
    async fn sample_errors(&self, run_id: &str, limit: usize) -> StoreResult<Vec<String>>;

    // -- Responses -------------------------------------------------------

    /// Insert (or replace, for the same run item) a response row, keeping
    /// the one-response-per-succeeded-item invariant.
    async fn upsert_response(&self, response: Response) -> StoreResult<()>;
    /// The response of one run item, if present.
    async fn response_for_item(&self, run_item_id: &str) -> StoreResult<Option<Response>>;
    /// Sum of response costs over the run, in cents.
    async fn sum_cost(&self, run_id: &str) -> StoreResult<f64>;

    // -- Exports ---------------------------------------------------------

    /// Insert an export.
    async fn create_export(&self, export: Export) -> StoreResult<()>;
    /// Fetch an export by id.
    async fn get_export(&self, id: &str) -> StoreResult<Export>;
    /// Replace an export row.
    async fn put_export(&self, export: Export) -> StoreResult<()>;

    // -- Deliveries ------------------------------------------------------

    /// Insert a delivery.
    async fn create_delivery(&self, delivery: Delivery) -> StoreResult<()>;
    /// Fetch a delivery by id.
    async fn get_delivery(&self, id: &str) -> StoreResult<Delivery>;
    /// Replace a delivery row.
    async fn put_delivery(&self, delivery: Delivery) -> StoreResult<()>;
    /// Delivery counts by status for one export.
    async fn delivery_stats(&self, export_id: &str)
    -> StoreResult<BTreeMap<DeliveryStatus, usize>>;
    /// Up to `limit` failed deliveries for one export, oldest first.
    async fn sample_failed_deliveries(
        &self,
        export_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Delivery>>;
}
