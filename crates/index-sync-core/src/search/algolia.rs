//! Algolia-compatible REST client.
//!
//! Reads go to the `-dsn` host, writes to the main host. Every write returns
//! a task id that is polled until the service reports it as published.

use super::{BrowsePage, CopyScope, SearchError, SearchResult, SearchService};
use async_trait::async_trait;
use index_sync_config::{ClientOptions, Credentials, IndexSettings, ObjectId, ObjectRecord};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

const HEADER_APP_ID: &str = "X-Algolia-Application-Id";
const HEADER_API_KEY: &str = "X-Algolia-API-Key";
const BROWSE_HITS_PER_PAGE: usize = 1000;

/// Polling behaviour while waiting for a write task.
#[derive(Debug, Clone)]
pub struct TaskWaitConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub timeout: Duration,
}

impl Default for TaskWaitConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(rename = "taskID")]
    task_id: i64,
}

#[derive(Debug, Deserialize)]
struct TaskStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct BrowseResponse {
    #[serde(default)]
    hits: Vec<ObjectRecord>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchRequest {
    requests: Vec<BatchOperation>,
}

#[derive(Debug, Serialize)]
struct BatchOperation {
    action: &'static str,
    body: Value,
}

#[derive(Debug, Clone)]
pub struct AlgoliaClient {
    client: Client,
    app_id: String,
    api_key: String,
    read_host: Url,
    write_host: Url,
    read_timeout: Duration,
    write_timeout: Duration,
    task_wait: TaskWaitConfig,
}

impl AlgoliaClient {
    pub fn new(credentials: &Credentials, options: &ClientOptions) -> SearchResult<Self> {
        let (read_host, write_host) = match &options.hosts {
            Some(base) => {
                let url = parse_url(base)?;
                (url.clone(), url)
            }
            None => (
                parse_url(&format!("https://{}-dsn.algolia.net", credentials.app_id))?,
                parse_url(&format!("https://{}.algolia.net", credentials.app_id))?,
            ),
        };

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(options.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            app_id: credentials.app_id.clone(),
            api_key: credentials.api_key.clone(),
            read_host,
            write_host,
            read_timeout: Duration::from_secs(options.read_timeout_secs),
            write_timeout: Duration::from_secs(options.write_timeout_secs),
            task_wait: TaskWaitConfig::default(),
        })
    }

    pub fn with_task_wait(mut self, task_wait: TaskWaitConfig) -> Self {
        self.task_wait = task_wait;
        self
    }

    fn index_url(&self, host: &Url, index: &str, tail: &[&str]) -> SearchResult<Url> {
        let mut url = host.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SearchError::InvalidUrl(host.to_string()))?;
            segments.pop_if_empty().extend(["1", "indexes", index]);
            segments.extend(tail);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, write: bool) -> RequestBuilder {
        let timeout = if write {
            self.write_timeout
        } else {
            self.read_timeout
        };
        self.client
            .request(method, url)
            .timeout(timeout)
            .header(HEADER_APP_ID, &self.app_id)
            .header(HEADER_API_KEY, &self.api_key)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        index: &str,
        request: RequestBuilder,
    ) -> SearchResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(SearchError::NotFound {
                index: index.to_string(),
            });
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::Http {
                status: status.as_u16(),
                message,
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn batch(&self, index: &str, requests: Vec<BatchOperation>) -> SearchResult<()> {
        let url = self.index_url(&self.write_host, index, &["batch"])?;
        let task: TaskResponse = self
            .send(
                index,
                self.request(Method::POST, url, true)
                    .json(&BatchRequest { requests }),
            )
            .await?;
        self.wait_task(index, task.task_id).await
    }

    async fn wait_task(&self, index: &str, task_id: i64) -> SearchResult<()> {
        let url = self.index_url(&self.read_host, index, &["task", &task_id.to_string()])?;
        let started = Instant::now();
        let mut backoff = self.task_wait.initial_backoff;

        loop {
            let status: TaskStatusResponse = self
                .send(index, self.request(Method::GET, url.clone(), false))
                .await?;
            if status.status == "published" {
                debug!("Task {} on {} published", task_id, index);
                return Ok(());
            }

            if started.elapsed() + backoff > self.task_wait.timeout {
                return Err(SearchError::TaskTimeout {
                    index: index.to_string(),
                    task_id,
                    elapsed: started.elapsed(),
                });
            }

            tokio::time::sleep(backoff).await;
            let next = Duration::from_secs_f64(
                backoff.as_secs_f64() * self.task_wait.backoff_multiplier,
            );
            backoff = next.min(self.task_wait.max_backoff);
        }
    }

    async fn operation(&self, source: &str, body: Value) -> SearchResult<()> {
        let url = self.index_url(&self.write_host, source, &["operation"])?;
        let task: TaskResponse = self
            .send(source, self.request(Method::POST, url, true).json(&body))
            .await?;
        self.wait_task(source, task.task_id).await
    }
}

fn parse_url(raw: &str) -> SearchResult<Url> {
    Url::parse(raw).map_err(|e| SearchError::InvalidUrl(format!("{}: {}", raw, e)))
}

fn browse_body(attributes: &[String], cursor: Option<&str>) -> Value {
    let mut body = json!({
        "attributesToRetrieve": attributes,
        "hitsPerPage": BROWSE_HITS_PER_PAGE,
    });
    if let Some(cursor) = cursor {
        body["cursor"] = Value::String(cursor.to_string());
    }
    body
}

fn save_operations(objects: Vec<ObjectRecord>) -> Vec<BatchOperation> {
    objects
        .into_iter()
        .map(|object| BatchOperation {
            action: "updateObject",
            body: object.into_value(),
        })
        .collect()
}

fn delete_operations(ids: Vec<ObjectId>) -> Vec<BatchOperation> {
    ids.into_iter()
        .map(|id| BatchOperation {
            action: "deleteObject",
            body: json!({ "objectID": id }),
        })
        .collect()
}

#[async_trait]
impl SearchService for AlgoliaClient {
    async fn index_exists(&self, index: &str) -> SearchResult<bool> {
        match self.get_settings(index).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn browse_page(
        &self,
        index: &str,
        attributes: &[String],
        cursor: Option<&str>,
    ) -> SearchResult<BrowsePage> {
        let url = self.index_url(&self.read_host, index, &["browse"])?;
        let response: BrowseResponse = self
            .send(
                index,
                self.request(Method::POST, url, false)
                    .json(&browse_body(attributes, cursor)),
            )
            .await?;
        Ok(BrowsePage {
            hits: response.hits,
            cursor: response.cursor,
        })
    }

    async fn save_objects(&self, index: &str, objects: Vec<ObjectRecord>) -> SearchResult<()> {
        if objects.is_empty() {
            return Ok(());
        }
        self.batch(index, save_operations(objects)).await
    }

    async fn delete_objects(&self, index: &str, ids: Vec<ObjectId>) -> SearchResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.batch(index, delete_operations(ids)).await
    }

    async fn get_settings(&self, index: &str) -> SearchResult<IndexSettings> {
        let url = self.index_url(&self.read_host, index, &["settings"])?;
        self.send(index, self.request(Method::GET, url, false))
            .await
    }

    async fn set_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
        forward_to_replicas: bool,
    ) -> SearchResult<()> {
        let mut url = self.index_url(&self.write_host, index, &["settings"])?;
        url.query_pairs_mut()
            .append_pair("forwardToReplicas", if forward_to_replicas { "true" } else { "false" });
        let task: TaskResponse = self
            .send(index, self.request(Method::PUT, url, true).json(settings))
            .await?;
        self.wait_task(index, task.task_id).await
    }

    async fn move_index(&self, source: &str, destination: &str) -> SearchResult<()> {
        self.operation(
            source,
            json!({ "operation": "move", "destination": destination }),
        )
        .await
    }

    async fn delete_index(&self, index: &str) -> SearchResult<()> {
        let url = self.index_url(&self.write_host, index, &[])?;
        let task: TaskResponse = match self
            .send(index, self.request(Method::DELETE, url, true))
            .await
        {
            Ok(task) => task,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        self.wait_task(index, task.task_id).await
    }

    async fn copy_index(
        &self,
        source: &str,
        destination: &str,
        scopes: &[CopyScope],
    ) -> SearchResult<()> {
        self.operation(
            source,
            json!({ "operation": "copy", "destination": destination, "scope": scopes }),
        )
        .await
    }
}
