use super::{QueryExecutor, QueryResponse};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use index_sync_config::SourceConfig;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
}

/// GraphQL over HTTP POST.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    client: Client,
    endpoint: String,
    headers: HashMap<String, String>,
}

impl GraphqlClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("Failed to build GraphQL HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            headers: HashMap::new(),
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow!("`source.endpoint` is required to run GraphQL queries"))?;
        Ok(Self::new(endpoint)?.with_headers(config.headers.clone()))
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryExecutor for GraphqlClient {
    async fn execute(&self, query: &str, variables: Option<&Value>) -> Result<QueryResponse> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&GraphqlRequest { query, variables });
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GraphQL request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "GraphQL endpoint returned {}: {}",
                status,
                error_text
            ));
        }

        response
            .json::<QueryResponse>()
            .await
            .context("Failed to decode GraphQL response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_missing_variables() {
        let body = serde_json::to_value(GraphqlRequest {
            query: "{ a }",
            variables: None,
        })
        .unwrap();
        assert_eq!(body, json!({ "query": "{ a }" }));

        let vars = json!({ "limit": 10 });
        let body = serde_json::to_value(GraphqlRequest {
            query: "{ a }",
            variables: Some(&vars),
        })
        .unwrap();
        assert_eq!(body["variables"]["limit"], 10);
    }

    #[test]
    fn from_config_requires_endpoint() {
        assert!(GraphqlClient::from_config(&SourceConfig::default()).is_err());

        let config = SourceConfig {
            endpoint: Some("http://localhost:8000/___graphql".to_string()),
            headers: HashMap::new(),
        };
        let client = GraphqlClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000/___graphql");
    }

    #[test]
    fn response_tolerates_missing_errors() {
        let response: QueryResponse = serde_json::from_value(json!({ "data": { "a": 1 } })).unwrap();
        assert!(!response.has_errors());

        let response: QueryResponse =
            serde_json::from_value(json!({ "data": null, "errors": [{ "message": "boom" }] }))
                .unwrap();
        assert!(response.has_errors());
    }
}
