// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory [`Store`] implementation.

use crate::{ItemPage, Store, StoreError, StoreResult};
use asc_core::{
    Campaign, Delivery, DeliveryStatus, Export, ItemStatus, Persona, Question, Response, Run,
    RunItem, RunStatusCounts, Topic,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    campaigns: HashMap<String, Campaign>,
    campaign_order: Vec<String>,
    topics: HashMap<String, Topic>,
    personas: HashMap<String, Persona>,
    questions: HashMap<String, Question>,
    question_order: Vec<String>,
    runs: HashMap<String, Run>,
    items: HashMap<String, RunItem>,
    fingerprints: HashSet<String>,
    responses_by_item: HashMap<String, Response>,
    exports: HashMap<String, Export>,
    deliveries: HashMap<String, Delivery>,
    delivery_order: Vec<String>,
}

/// Shared-map store of record.
///
/// All maps sit behind a single `RwLock`, which keeps every trait method
/// atomic; method bodies never await while holding the guard.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_run_items(state: &State, run_id: &str) -> Vec<RunItem> {
    let mut items: Vec<RunItem> = state
        .items
        .values()
        .filter(|i| i.run_id == run_id)
        .cloned()
        .collect();
    items.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
    items
}

#[async_trait]
impl Store for MemoryStore {
    // -- Campaigns -------------------------------------------------------

    async fn create_campaign(&self, campaign: Campaign) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.campaigns.values().any(|c| c.name == campaign.name) {
            return Err(StoreError::Conflict {
                reason: format!("campaign name '{}' already exists", campaign.name),
            });
        }
        state.campaign_order.push(campaign.id.clone());
        state.campaigns.insert(campaign.id.clone(), campaign);
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> StoreResult<Campaign> {
        let state = self.state.read().await;
        state
            .campaigns
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("campaign", id))
    }

    async fn find_campaign_by_name(&self, name: &str) -> StoreResult<Option<Campaign>> {
        let state = self.state.read().await;
        Ok(state.campaigns.values().find(|c| c.name == name).cloned())
    }

    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        let state = self.state.read().await;
        Ok(state
            .campaign_order
            .iter()
            .filter_map(|id| state.campaigns.get(id).cloned())
            .collect())
    }

    // -- Topics ----------------------------------------------------------

    async fn create_topic(&self, topic: Topic) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.campaigns.contains_key(&topic.campaign_id) {
            return Err(StoreError::not_found("campaign", &topic.campaign_id));
        }
        state.topics.insert(topic.id.clone(), topic);
        Ok(())
    }

    async fn get_topic(&self, id: &str) -> StoreResult<Topic> {
        let state = self.state.read().await;
        state
            .topics
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("topic", id))
    }

    async fn find_topic(&self, campaign_id: &str, title: &str) -> StoreResult<Option<Topic>> {
        let state = self.state.read().await;
        Ok(state
            .topics
            .values()
            .find(|t| t.campaign_id == campaign_id && t.title == title)
            .cloned())
    }

    // -- Personas --------------------------------------------------------

    async fn create_persona(&self, persona: Persona) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.personas.values().any(|p| p.name == persona.name) {
            return Err(StoreError::Conflict {
                reason: format!("persona name '{}' already exists", persona.name),
            });
        }
        state.personas.insert(persona.id.clone(), persona);
        Ok(())
    }

    async fn get_persona(&self, id: &str) -> StoreResult<Persona> {
        let state = self.state.read().await;
        state
            .personas
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("persona", id))
    }

    async fn find_persona_by_name(&self, name: &str) -> StoreResult<Option<Persona>> {
        let state = self.state.read().await;
        Ok(state.personas.values().find(|p| p.name == name).cloned())
    }

    // -- Questions -------------------------------------------------------

    async fn create_question(&self, question: Question) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.topics.contains_key(&question.topic_id) {
            return Err(StoreError::not_found("topic", &question.topic_id));
        }
        if !state.personas.contains_key(&question.persona_id) {
            return Err(StoreError::not_found("persona", &question.persona_id));
        }
        state.question_order.push(question.id.clone());
        state.questions.insert(question.id.clone(), question);
        Ok(())
    }

    async fn get_question(&self, id: &str) -> StoreResult<Question> {
        let state = self.state.read().await;
        state
            .questions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("question", id))
    }

    async fn find_question_by_external_id(
        &self,
        topic_id: &str,
        external_id: &str,
    ) -> StoreResult<Option<Question>> {
        let state = self.state.read().await;
        Ok(state
            .questions
            .values()
            .find(|q| q.topic_id == topic_id && q.external_id() == Some(external_id))
            .cloned())
    }

    async fn questions_for_campaign(&self, campaign_id: &str) -> StoreResult<Vec<Question>> {
        let state = self.state.read().await;
        let topic_ids: HashSet<&String> = state
            .topics
            .values()
            .filter(|t| t.campaign_id == campaign_id)
            .map(|t| &t.id)
            .collect();
        Ok(state
            .question_order
            .iter()
            .filter_map(|id| state.questions.get(id))
            .filter(|q| topic_ids.contains(&q.topic_id))
            .cloned()
            .collect())
    }

    // -- Runs ------------------------------------------------------------

    async fn create_run(&self, run: Run) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.campaigns.contains_key(&run.campaign_id) {
            return Err(StoreError::not_found("campaign", &run.campaign_id));
        }
        state.runs.insert(run.id.clone(), run);
        Ok(())
    }

    async fn get_run(&self, id: &str) -> StoreResult<Run> {
        let state = self.state.read().await;
        state
            .runs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("run", id))
    }

    async fn put_run(&self, run: Run) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.runs.contains_key(&run.id) {
            return Err(StoreError::not_found("run", &run.id));
        }
        state.runs.insert(run.id.clone(), run);
        Ok(())
    }

    // -- Run items -------------------------------------------------------

    async fn insert_item_if_absent(&self, item: RunItem) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.fingerprints.contains(&item.fingerprint) {
            return Ok(false);
        }
        state.fingerprints.insert(item.fingerprint.clone());
        state.items.insert(item.id.clone(), item);
        Ok(true)
    }

    async fn get_item(&self, id: &str) -> StoreResult<RunItem> {
        let state = self.state.read().await;
        state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("run item", id))
    }

    async fn claim_item(&self, id: &str, retry: bool) -> StoreResult<Option<RunItem>> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("run item", id))?;
        let claimable = item.status == ItemStatus::Pending
            || (retry && item.status == ItemStatus::Failed);
        if !claimable {
            return Ok(None);
        }
        item.status = ItemStatus::Running;
        item.attempt_count += 1;
        item.updated_at = chrono::Utc::now();
        Ok(Some(item.clone()))
    }

    async fn put_item(&self, item: RunItem) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.items.contains_key(&item.id) {
            return Err(StoreError::not_found("run item", &item.id));
        }
        state.items.insert(item.id.clone(), item);
        Ok(())
    }

    async fn items_for_run(
        &self,
        run_id: &str,
        status: Option<ItemStatus>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<ItemPage> {
        let state = self.state.read().await;
        let mut items = sorted_run_items(&state, run_id);
        if let Some(status) = status {
            items.retain(|i| i.status == status);
        }
        let total = items.len();
        let items = items.into_iter().skip(offset).take(limit).collect();
        Ok(ItemPage { items, total })
    }

    async fn status_counts(&self, run_id: &str) -> StoreResult<RunStatusCounts> {
        let state = self.state.read().await;
        let mut counts = RunStatusCounts::default();
        for item in state.items.values().filter(|i| i.run_id == run_id) {
            counts.total += 1;
            match item.status {
                ItemStatus::Pending => counts.pending += 1,
                ItemStatus::Running => counts.running += 1,
                ItemStatus::Succeeded => counts.succeeded += 1,
                ItemStatus::Failed => counts.failed += 1,
                ItemStatus::Skipped => counts.skipped += 1,
            }
        }
        Ok(counts)
    }

    async fn sample_errors(&self, run_id: &str, limit: usize) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let mut seen = HashSet::new();
        let mut errors = Vec::new();
        for item in sorted_run_items(&state, run_id) {
            if let Some(err) = item.last_error
                && seen.insert(err.clone())
            {
                errors.push(err);
                if errors.len() == limit {
                    break;
                }
            }
        }
        Ok(errors)
    }

    // -- Responses -------------------------------------------------------

    async fn upsert_response(&self, response: Response) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.items.contains_key(&response.run_item_id) {
            return Err(StoreError::not_found("run item", &response.run_item_id));
        }
        state
            .responses_by_item
            .insert(response.run_item_id.clone(), response);
        Ok(())
    }

    async fn response_for_item(&self, run_item_id: &str) -> StoreResult<Option<Response>> {
        let state = self.state.read().await;
        Ok(state.responses_by_item.get(run_item_id).cloned())
    }

    async fn sum_cost(&self, run_id: &str) -> StoreResult<f64> {
        let state = self.state.read().await;
        let total = state
            .responses_by_item
            .values()
            .filter(|r| {
                state
                    .items
                    .get(&r.run_item_id)
                    .is_some_and(|i| i.run_id == run_id)
            })
            .map(|r| r.cost_cents)
            .sum();
        Ok(total)
    }

    // -- Exports ---------------------------------------------------------

    async fn create_export(&self, export: Export) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.runs.contains_key(&export.run_id) {
            return Err(StoreError::not_found("run", &export.run_id));
        }
        state.exports.insert(export.id.clone(), export);
        Ok(())
    }

    async fn get_export(&self, id: &str) -> StoreResult<Export> {
        let state = self.state.read().await;
        state
            .exports
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("export", id))
    }

    async fn put_export(&self, export: Export) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.exports.contains_key(&export.id) {
            return Err(StoreError::not_found("export", &export.id));
        }
        state.exports.insert(export.id.clone(), export);
        Ok(())
    }

    // -- Deliveries ------------------------------------------------------

    async fn create_delivery(&self, delivery: Delivery) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.exports.contains_key(&delivery.export_id) {
            return Err(StoreError::not_found("export", &delivery.export_id));
        }
        state.delivery_order.push(delivery.id.clone());
        state.deliveries.insert(delivery.id.clone(), delivery);
        Ok(())
    }

    async fn get_delivery(&self, id: &str) -> StoreResult<Delivery> {
        let state = self.state.read().await;
        state
            .deliveries
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("delivery", id))
    }

    async fn put_delivery(&self, delivery: Delivery) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if !state.deliveries.contains_key(&delivery.id) {
            return Err(StoreError::not_found("delivery", &delivery.id));
        }
        state.deliveries.insert(delivery.id.clone(), delivery);
        Ok(())
    }

    async fn delivery_stats(
        &self,
        export_id: &str,
    ) -> StoreResult<BTreeMap<DeliveryStatus, usize>> {
        let state = self.state.read().await;
        let mut stats = BTreeMap::new();
        for delivery in state.deliveries.values().filter(|d| d.export_id == export_id) {
            *stats.entry(delivery.status).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn sample_failed_deliveries(
        &self,
        export_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<Delivery>> {
        let state = self.state.read().await;
        Ok(state
            .delivery_order
            .iter()
            .filter_map(|id| state.deliveries.get(id))
            .filter(|d| d.export_id == export_id && d.status == DeliveryStatus::Failed)
            .take(limit)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use asc_core::{ExportFormat, ExportStatus, RunSpec, RunStatus, TokenUsage, new_id};
    use chrono::{Duration, Utc};
    use serde_json::json;

    async fn seed_campaign(store: &MemoryStore) -> (Campaign, Topic, Persona) {
        let campaign = Campaign {
            id: new_id(),
            name: "C".into(),
            product_name: Some("Widget".into()),
            created_at: Utc::now(),
        };
        store.create_campaign(campaign.clone()).await.unwrap();

        let topic = Topic {
            id: new_id(),
            campaign_id: campaign.id.clone(),
            title: "Battery".into(),
            description: None,
            created_at: Utc::now(),
        };
        store.create_topic(topic.clone()).await.unwrap();

        let persona = Persona {
            id: new_id(),
            name: "Reviewer".into(),
            role: Some("reviewer".into()),
            domain: None,
            locale: None,
            tone: None,
            extras: json!({}),
            created_at: Utc::now(),
        };
        store.create_persona(persona.clone()).await.unwrap();

        (campaign, topic, persona)
    }

    fn question(topic: &Topic, persona: &Persona, external_id: &str) -> Question {
        Question {
            id: new_id(),
            topic_id: topic.id.clone(),
            persona_id: persona.id.clone(),
            text: "How long does the battery last?".into(),
            metadata: json!({"external_id": external_id}),
            created_at: Utc::now(),
        }
    }

    fn run(campaign: &Campaign) -> Run {
        Run {
            id: new_id(),
            campaign_id: campaign.id.clone(),
            label: None,
            spec: RunSpec {
                providers: vec![],
                prompt_version: "v1".into(),
            },
            status: RunStatus::Pending,
            cost_cents: 0.0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn item(run: &Run, question: &Question, fingerprint: &str) -> RunItem {
        RunItem {
            id: new_id(),
            run_id: run.id.clone(),
            question_id: question.id.clone(),
            fingerprint: fingerprint.into(),
            status: ItemStatus::Pending,
            attempt_count: 0,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn campaign_names_are_unique() {
        let store = MemoryStore::new();
        seed_campaign(&store).await;
        let dup = Campaign {
            id: new_id(),
            name: "C".into(),
            product_name: None,
            created_at: Utc::now(),
        };
        assert!(matches!(
            store.create_campaign(dup).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn question_lookup_by_external_id() {
        let store = MemoryStore::new();
        let (_, topic, persona) = seed_campaign(&store).await;
        store
            .create_question(question(&topic, &persona, "Q1"))
            .await
            .unwrap();

        let found = store
            .find_question_by_external_id(&topic.id, "Q1")
            .await
            .unwrap();
        assert!(found.is_some());
        let missing = store
            .find_question_by_external_id(&topic.id, "Q2")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn questions_for_campaign_joins_via_topics() {
        let store = MemoryStore::new();
        let (campaign, topic, persona) = seed_campaign(&store).await;
        store
            .create_question(question(&topic, &persona, "Q1"))
            .await
            .unwrap();
        store
            .create_question(question(&topic, &persona, "Q2"))
            .await
            .unwrap();

        let questions = store.questions_for_campaign(&campaign.id).await.unwrap();
        assert_eq!(questions.len(), 2);
        // Insert order is preserved.
        assert_eq!(questions[0].external_id(), Some("Q1"));
    }

    #[tokio::test]
    async fn duplicate_fingerprint_is_a_silent_skip() {
        let store = MemoryStore::new();
        let (campaign, topic, persona) = seed_campaign(&store).await;
        let q = question(&topic, &persona, "Q1");
        store.create_question(q.clone()).await.unwrap();
        let r = run(&campaign);
        store.create_run(r.clone()).await.unwrap();

        assert!(store.insert_item_if_absent(item(&r, &q, "fp-1")).await.unwrap());
        assert!(!store.insert_item_if_absent(item(&r, &q, "fp-1")).await.unwrap());
        assert!(store.insert_item_if_absent(item(&r, &q, "fp-2")).await.unwrap());

        let counts = store.status_counts(&r.id).await.unwrap();
        assert_eq!(counts.total, 2);
    }

    #[tokio::test]
    async fn pagination_and_status_filter() {
        let store = MemoryStore::new();
        let (campaign, topic, persona) = seed_campaign(&store).await;
        let q = question(&topic, &persona, "Q1");
        store.create_question(q.clone()).await.unwrap();
        let r = run(&campaign);
        store.create_run(r.clone()).await.unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let mut it = item(&r, &q, &format!("fp-{i}"));
            it.created_at = base + Duration::milliseconds(i);
            if i % 2 == 0 {
                it.status = ItemStatus::Succeeded;
            }
            store.insert_item_if_absent(it).await.unwrap();
        }

        let page = store.items_for_run(&r.id, None, 2, 1).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].fingerprint, "fp-1");

        let succeeded = store
            .items_for_run(&r.id, Some(ItemStatus::Succeeded), 10, 0)
            .await
            .unwrap();
        assert_eq!(succeeded.total, 3);
    }

    #[tokio::test]
    async fn sample_errors_dedupes_and_limits() {
        let store = MemoryStore::new();
        let (campaign, topic, persona) = seed_campaign(&store).await;
        let q = question(&topic, &persona, "Q1");
        store.create_question(q.clone()).await.unwrap();
        let r = run(&campaign);
        store.create_run(r.clone()).await.unwrap();

        for i in 0..4 {
            let mut it = item(&r, &q, &format!("fp-{i}"));
            it.status = ItemStatus::Failed;
            it.last_error = Some(if i < 3 { "boom".into() } else { "other".into() });
            store.insert_item_if_absent(it).await.unwrap();
        }

        let errors = store.sample_errors(&r.id, 10).await.unwrap();
        assert_eq!(errors.len(), 2);

        let limited = store.sample_errors(&r.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn response_upsert_keeps_one_row_per_item() {
        let store = MemoryStore::new();
        let (campaign, topic, persona) = seed_campaign(&store).await;
        let q = question(&topic, &persona, "Q1");
        store.create_question(q.clone()).await.unwrap();
        let r = run(&campaign);
        store.create_run(r.clone()).await.unwrap();
        let it = item(&r, &q, "fp-1");
        store.insert_item_if_absent(it.clone()).await.unwrap();

        let make_response = |cost: f64| Response {
            id: new_id(),
            run_item_id: it.id.clone(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            prompt_version: "v1".into(),
            request: json!({}),
            response: json!({"answer": "12h"}),
            text: "12h".into(),
            citations: vec![],
            token_usage: TokenUsage::new(100, 50),
            latency_ms: 10,
            cost_cents: cost,
            created_at: Utc::now(),
        };

        store.upsert_response(make_response(4.5)).await.unwrap();
        store.upsert_response(make_response(4.5)).await.unwrap();

        assert_eq!(store.sum_cost(&r.id).await.unwrap(), 4.5);
        assert!(store.response_for_item(&it.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delivery_stats_and_failed_samples() {
        let store = MemoryStore::new();
        let (campaign, ..) = seed_campaign(&store).await;
        let r = run(&campaign);
        store.create_run(r.clone()).await.unwrap();
        let export = Export {
            id: new_id(),
            run_id: r.id.clone(),
            format: ExportFormat::Jsonl,
            mapper_name: Some("example_partner".into()),
            mapper_version: "v1".into(),
            config: json!({}),
            status: ExportStatus::Pending,
            file_ref: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_export(export.clone()).await.unwrap();

        for i in 0..7 {
            let delivery = Delivery {
                id: new_id(),
                export_id: export.id.clone(),
                run_id: r.id.clone(),
                mapper_name: "example_partner".into(),
                mapper_version: "v1".into(),
                payload: json!({}),
                status: if i < 2 {
                    DeliveryStatus::Succeeded
                } else {
                    DeliveryStatus::Failed
                },
                attempts: 1,
                last_error: None,
                response_body: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            store.create_delivery(delivery).await.unwrap();
        }

        let stats = store.delivery_stats(&export.id).await.unwrap();
        assert_eq!(stats[&DeliveryStatus::Succeeded], 2);
        assert_eq!(stats[&DeliveryStatus::Failed], 5);

        let samples = store.sample_failed_deliveries(&export.id, 5).await.unwrap();
        assert_eq!(samples.len(), 5);
    }

    #[tokio::test]
    async fn claim_follows_the_item_state_machine() {
        let store = MemoryStore::new();
        let (campaign, topic, persona) = seed_campaign(&store).await;
        let q = question(&topic, &persona, "Q1");
        store.create_question(q.clone()).await.unwrap();
        let r = run(&campaign);
        store.create_run(r.clone()).await.unwrap();
        let it = item(&r, &q, "fp-1");
        store.insert_item_if_absent(it.clone()).await.unwrap();

        // First claim wins and increments the attempt counter.
        let claimed = store.claim_item(&it.id, false).await.unwrap().unwrap();
        assert_eq!(claimed.status, ItemStatus::Running);
        assert_eq!(claimed.attempt_count, 1);

        // A duplicated task cannot re-claim a running item.
        assert!(store.claim_item(&it.id, false).await.unwrap().is_none());

        // Failed items are only claimable by retry tasks.
        let mut failed = claimed.clone();
        failed.status = ItemStatus::Failed;
        store.put_item(failed).await.unwrap();
        assert!(store.claim_item(&it.id, false).await.unwrap().is_none());
        let retried = store.claim_item(&it.id, true).await.unwrap().unwrap();
        assert_eq!(retried.attempt_count, 2);

        // Succeeded items are never claimable again.
        let mut done = retried;
        done.status = ItemStatus::Succeeded;
        store.put_item(done).await.unwrap();
        assert!(store.claim_item(&it.id, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_entities_error() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_run("nope").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.get_item("nope").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.get_delivery("nope").await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
