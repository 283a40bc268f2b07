//! OpenSearch bootstrap: ML model, ingest pipeline and index.
//!
//! Long-running ML plugin operations are polled with a [`PollPolicy`]. A
//! `FAILED` state or running out of attempts is reported as an error.
//!
//! | Step | Request |
//! |------|---------|
//! | find model | `POST /_plugins/_ml/models/_search` |
//! | upload model | `POST /_plugins/_ml/models/_upload`, then `GET /_plugins/_ml/tasks/{task}` |
//! | load model | `POST /_plugins/_ml/models/{id}/_load` until `CREATED` |
//! | pipeline | `PUT /_ingest/pipeline/nlp-pipeline` |
//! | index | `PUT /{index}` |

use anyhow::{bail, Context, Result};
use issue_dedupe_core::query::{DESCRIPTION_EMBEDDING_FIELD, TITLE_EMBEDDING_FIELD};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::opensearch::{check_status, OpenSearchClient};

pub const PIPELINE_NAME: &str = "nlp-pipeline";
pub const EMBEDDING_DIMENSION: u32 = 384;

const MODEL_URL: &str = "https://artifacts.opensearch.org/models/ml-models/huggingface/sentence-transformers/all-MiniLM-L6-v2/1.0.1/torch_script/sentence-transformers_all-MiniLM-L6-v2-1.0.1-torch_script.zip";
const MODEL_CONTENT_HASH: &str =
    "c15f0d2e62d872be5b5bc6c84d2e0f4921541e29fefbef51d59cc10a8ae30e0f";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.admin.poll_interval_secs),
            max_attempts: config.admin.max_attempts,
        }
    }
}

/// State of one poll step.
#[derive(Debug)]
pub enum Poll<T> {
    Ready(T),
    Pending(String),
}

/// Repeats `step` until it is ready, sleeping `policy.interval` between
/// attempts.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, what: &str, mut step: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>>>,
{
    let mut last_state = String::new();
    for attempt in 1..=policy.max_attempts {
        match step().await? {
            Poll::Ready(value) => return Ok(value),
            Poll::Pending(state) => {
                debug!(what, attempt, state = %state, "waiting");
                last_state = state;
            }
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    bail!(
        "{} not ready after {} attempts (last state: {})",
        what,
        policy.max_attempts,
        last_state
    )
}

pub fn model_upload_body(model_name: &str) -> Value {
    json!({
        "name": model_name,
        "version": "1.0.0",
        "description": "Sentence embedding model for duplicate issue search",
        "model_format": "TORCH_SCRIPT",
        "model_config": {
            "model_type": "bert",
            "embedding_dimension": EMBEDDING_DIMENSION,
            "framework_type": "sentence_transformers"
        },
        "model_content_hash_value": MODEL_CONTENT_HASH,
        "url": MODEL_URL
    })
}

pub fn pipeline_body(model_id: &str) -> Value {
    let mut field_map = serde_json::Map::new();
    field_map.insert("title".into(), json!(TITLE_EMBEDDING_FIELD));
    field_map.insert("description".into(), json!(DESCRIPTION_EMBEDDING_FIELD));
    json!({
        "description": "Issue embedding pipeline",
        "processors": [
            { "text_embedding": { "model_id": model_id, "field_map": field_map } }
        ]
    })
}

pub fn index_body() -> Value {
    let vector = json!({
        "type": "knn_vector",
        "dimension": EMBEDDING_DIMENSION,
        "method": { "name": "hnsw" }
    });
    let mut properties = serde_json::Map::new();
    properties.insert(TITLE_EMBEDDING_FIELD.into(), vector.clone());
    properties.insert("title".into(), json!({ "type": "text" }));
    properties.insert(DESCRIPTION_EMBEDDING_FIELD.into(), vector);
    properties.insert("description".into(), json!({ "type": "text" }));

    json!({
        "settings": {
            "index.knn": true,
            "default_pipeline": PIPELINE_NAME
        },
        "mappings": {
            "_source": { "excludes": [TITLE_EMBEDDING_FIELD, DESCRIPTION_EMBEDDING_FIELD] },
            "properties": properties
        }
    })
}

fn parse<T: for<'de> Deserialize<'de>>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body).with_context(|| format!("Malformed {} response: {}", what, body))
}

#[derive(Deserialize)]
struct ModelSearchResponse {
    hits: ModelHits,
}

#[derive(Deserialize)]
struct ModelHits {
    hits: Vec<ModelHit>,
}

#[derive(Deserialize)]
struct ModelHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Option<ModelSource>,
}

#[derive(Deserialize)]
struct ModelSource {
    #[serde(default)]
    model_id: Option<String>,
}

/// Extracts the model id from a model search response. Chunked models carry
/// it in `_source.model_id`; the model document itself only has `_id`.
pub fn decode_model_search(body: &str) -> Result<Option<String>> {
    let response: ModelSearchResponse = parse(body, "model search")?;
    Ok(response.hits.hits.into_iter().next().map(|hit| {
        hit.source
            .and_then(|s| s.model_id)
            .unwrap_or(hit.id)
    }))
}

/// Looks up a registered model by name.
pub async fn find_model(client: &OpenSearchClient, model_name: &str) -> Result<Option<String>> {
    let body = json!({ "query": { "term": { "name.keyword": { "value": model_name } } } });
    let (status, text) = client
        .send(
            reqwest::Method::POST,
            "_plugins/_ml/models/_search",
            Some(&body),
        )
        .await?;
    // The ML index does not exist before the first upload.
    if status == 404 {
        return Ok(None);
    }
    check_status(status, &text)?;
    decode_model_search(&text)
}

/// Model id from config, or from a lookup by name.
pub async fn resolve_model_id(client: &OpenSearchClient, config: &Config) -> Result<String> {
    if let Some(ref id) = config.opensearch.model_id {
        return Ok(id.clone());
    }
    find_model(client, &config.opensearch.model_name)
        .await?
        .with_context(|| {
            format!(
                "Model '{}' is not registered; run `issue-dedupe init-opensearch` first",
                config.opensearch.model_name
            )
        })
}

#[derive(Deserialize)]
struct UploadResponse {
    task_id: String,
}

#[derive(Deserialize)]
struct TaskResponse {
    state: String,
    #[serde(default)]
    model_id: Option<String>,
}

/// Uploads the embedding model and waits for the upload task.
pub async fn upload_model(
    client: &OpenSearchClient,
    model_name: &str,
    policy: PollPolicy,
) -> Result<String> {
    let (status, text) = client
        .send(
            reqwest::Method::POST,
            "_plugins/_ml/models/_upload",
            Some(&model_upload_body(model_name)),
        )
        .await?;
    check_status(status, &text)?;
    let upload: UploadResponse = parse(&text, "model upload")?;
    info!(task_id = %upload.task_id, "model upload started");

    let path = format!("_plugins/_ml/tasks/{}", upload.task_id);
    let path = path.as_str();
    poll_until(policy, "model upload", move || upload_task_state(client, path)).await
}

async fn upload_task_state(client: &OpenSearchClient, path: &str) -> Result<Poll<String>> {
    let (status, text) = client.send(reqwest::Method::GET, path, None).await?;
    check_status(status, &text)?;
    let task: TaskResponse = parse(&text, "task")?;
    match task.state.as_str() {
        "COMPLETED" => task
            .model_id
            .map(Poll::Ready)
            .with_context(|| format!("Completed task without model_id: {}", text)),
        "FAILED" => bail!("Model upload failed: {}", text),
        other => Ok(Poll::Pending(other.to_string())),
    }
}

#[derive(Deserialize)]
struct LoadResponse {
    status: String,
}

/// Loads (deploys) a model and waits until it is `CREATED`.
pub async fn load_model(client: &OpenSearchClient, model_id: &str, policy: PollPolicy) -> Result<()> {
    let path = format!("_plugins/_ml/models/{}/_load", model_id);
    let path = path.as_str();
    poll_until(policy, "model load", move || load_state(client, path)).await?;
    info!(model_id, "model loaded");
    Ok(())
}

async fn load_state(client: &OpenSearchClient, path: &str) -> Result<Poll<()>> {
    let (status, text) = client.send(reqwest::Method::POST, path, None).await?;
    check_status(status, &text)?;
    let load: LoadResponse = parse(&text, "model load")?;
    match load.status.as_str() {
        "CREATED" => Ok(Poll::Ready(())),
        "FAILED" => bail!("Model load failed: {}", text),
        other => Ok(Poll::Pending(other.to_string())),
    }
}

pub async fn create_pipeline(client: &OpenSearchClient, model_id: &str) -> Result<()> {
    let path = format!("_ingest/pipeline/{}", PIPELINE_NAME);
    let (status, text) = client
        .send(reqwest::Method::PUT, &path, Some(&pipeline_body(model_id)))
        .await?;
    check_status(status, &text)?;
    info!(pipeline = PIPELINE_NAME, "pipeline created");
    Ok(())
}

pub async fn create_index(client: &OpenSearchClient) -> Result<()> {
    let (status, text) = client
        .send(reqwest::Method::PUT, client.index(), Some(&index_body()))
        .await?;
    check_status(status, &text)?;
    info!(index = client.index(), "index created");
    Ok(())
}

/// `init-opensearch`: upload and load the model, then create the pipeline
/// and the index.
pub async fn run_init(config: &Config) -> Result<()> {
    let client = OpenSearchClient::from_config(config)?;
    let policy = PollPolicy::from_config(config);

    info!(model = %config.opensearch.model_name, "creating model");
    let model_id = upload_model(&client, &config.opensearch.model_name, policy).await?;
    load_model(&client, &model_id, policy).await?;
    create_pipeline(&client, &model_id).await?;
    create_index(&client).await?;

    println!("OpenSearch initialized (model id: {}).", model_id);
    Ok(())
}

/// `load-model`: reload the configured model, e.g. after a cluster restart.
pub async fn run_load_model(config: &Config) -> Result<()> {
    let client = OpenSearchClient::from_config(config)?;
    let model_id = resolve_model_id(&client, config).await?;
    load_model(&client, &model_id, PollPolicy::from_config(config)).await?;
    println!("Model {} loaded.", model_id);
    Ok(())
}

/// `create-index`
pub async fn run_create_index(config: &Config) -> Result<()> {
    let client = OpenSearchClient::from_config(config)?;
    create_index(&client).await?;
    println!("Index '{}' created.", client.index());
    Ok(())
}
