// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bulk question import.
//!
//! Campaigns, topics and personas are upserted by their natural keys;
//! questions are inserted unless `(topic, external_id)` already exists,
//! which makes re-posting the same batch a no-op.

use crate::RuntimeError;
use asc_core::{Campaign, Persona, Question, Topic, new_id};
use asc_store::Store;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info};

/// One tuple of a question import batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportItem {
    /// Campaign name (upserted).
    pub campaign: String,
    /// Topic within the campaign (upserted by title).
    pub topic: TopicInput,
    /// Persona asking the question (upserted by name).
    pub persona: PersonaInput,
    /// The question itself.
    pub question: QuestionInput,
    /// Per-question provider setting overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_overrides: Option<Value>,
}

/// Topic fields of an import item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicInput {
    /// Topic title.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Persona fields of an import item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersonaInput {
    /// Persona name.
    pub name: String,
    /// Role.
    #[serde(default)]
    pub role: Option<String>,
    /// Domain.
    #[serde(default)]
    pub domain: Option<String>,
    /// Locale.
    #[serde(default)]
    pub locale: Option<String>,
    /// Tone.
    #[serde(default)]
    pub tone: Option<String>,
    /// Free-form extras.
    #[serde(default)]
    pub extras: Value,
}

/// Question fields of an import item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionInput {
    /// Uniqueness key within the topic.
    pub external_id: String,
    /// Question text.
    pub text: String,
    /// Additional free-form metadata.
    #[serde(default)]
    pub metadata: Value,
}

/// Result of one import batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ImportOutcome {
    /// Questions newly inserted.
    pub imported: usize,
    /// Questions skipped as `(topic, external_id)` duplicates.
    pub skipped: usize,
    /// Per-item failures (`"item N: reason"`).
    pub errors: Vec<String>,
}

/// Import a batch of question tuples. Item failures are collected, not
/// fatal: the rest of the batch still lands.
pub async fn import_questions(
    store: &dyn Store,
    items: &[ImportItem],
) -> Result<ImportOutcome, RuntimeError> {
    info!(items = items.len(), "question import started");
    let mut outcome = ImportOutcome::default();

    for (idx, item) in items.iter().enumerate() {
        match import_one(store, item).await {
            Ok(true) => outcome.imported += 1,
            Ok(false) => outcome.skipped += 1,
            Err(err) => {
                error!(idx, error = %err, "import item failed");
                outcome.errors.push(format!("item {idx}: {err}"));
            }
        }
    }

    info!(
        imported = outcome.imported,
        skipped = outcome.skipped,
        errors = outcome.errors.len(),
        "question import complete"
    );
    Ok(outcome)
}

async fn import_one(store: &dyn Store, item: &ImportItem) -> Result<bool, RuntimeError> {
    let campaign = upsert_campaign(store, &item.campaign).await?;
    let topic = upsert_topic(store, &campaign, &item.topic).await?;
    let persona = upsert_persona(store, &item.persona).await?;

    if store
        .find_question_by_external_id(&topic.id, &item.question.external_id)
        .await?
        .is_some()
    {
        return Ok(false);
    }

    let mut metadata = match &item.question.metadata {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    metadata.insert("external_id".into(), json!(item.question.external_id));
    metadata.insert(
        "provider_overrides".into(),
        item.provider_overrides.clone().unwrap_or_else(|| json!({})),
    );

    store
        .create_question(Question {
            id: new_id(),
            topic_id: topic.id.clone(),
            persona_id: persona.id.clone(),
            text: item.question.text.clone(),
            metadata: Value::Object(metadata),
            created_at: Utc::now(),
        })
        .await?;
    Ok(true)
}

async fn upsert_campaign(store: &dyn Store, name: &str) -> Result<Campaign, RuntimeError> {
    if let Some(existing) = store.find_campaign_by_name(name).await? {
        return Ok(existing);
    }
    let campaign = Campaign {
        id: new_id(),
        name: name.to_string(),
        product_name: None,
        created_at: Utc::now(),
    };
    store.create_campaign(campaign.clone()).await?;
    Ok(campaign)
}

async fn upsert_topic(
    store: &dyn Store,
    campaign: &Campaign,
    input: &TopicInput,
) -> Result<Topic, RuntimeError> {
    if let Some(existing) = store.find_topic(&campaign.id, &input.title).await? {
        return Ok(existing);
    }
    let topic = Topic {
        id: new_id(),
        campaign_id: campaign.id.clone(),
        title: input.title.clone(),
        description: input.description.clone(),
        created_at: Utc::now(),
    };
    store.create_topic(topic.clone()).await?;
    Ok(topic)
}

async fn upsert_persona(store: &dyn Store, input: &PersonaInput) -> Result<Persona, RuntimeError> {
    if let Some(existing) = store.find_persona_by_name(&input.name).await? {
        return Ok(existing);
    }
    let persona = Persona {
        id: new_id(),
        name: input.name.clone(),
        role: input.role.clone(),
        domain: input.domain.clone(),
        locale: input.locale.clone(),
        tone: input.tone.clone(),
        extras: input.extras.clone(),
        created_at: Utc::now(),
    };
    store.create_persona(persona.clone()).await?;
    Ok(persona)
}
