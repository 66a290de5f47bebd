//! Test doubles for the engine's collaborators.

use crate::reporter::Reporter;
use crate::source::{QueryExecutor, QueryResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

enum Canned {
    Response(QueryResponse),
    Error(String),
}

/// Query executor answering from a fixed table keyed by query text.
#[derive(Default)]
pub struct StaticQueryExecutor {
    responses: HashMap<String, Canned>,
    calls: Mutex<Vec<String>>,
}

impl StaticQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, query: impl Into<String>, response: QueryResponse) -> Self {
        self.responses
            .insert(query.into(), Canned::Response(response));
        self
    }

    /// Respond with `{ data: records }`.
    pub fn with_records(self, query: impl Into<String>, records: Vec<Value>) -> Self {
        self.with_response(query, QueryResponse::data(Value::Array(records)))
    }

    pub fn with_error(mut self, query: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses
            .insert(query.into(), Canned::Error(message.into()));
        self
    }

    /// Queries executed so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QueryExecutor for StaticQueryExecutor {
    async fn execute(&self, query: &str, _variables: Option<&Value>) -> Result<QueryResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(query.to_string());
        }
        match self.responses.get(query) {
            Some(Canned::Response(response)) => Ok(response.clone()),
            Some(Canned::Error(message)) => Err(anyhow!("{}", message)),
            None => Err(anyhow!("no canned response for query `{}`", query)),
        }
    }
}

/// Reporter that keeps every message for later assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    statuses: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    fatals: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<String> {
        snapshot(&self.statuses)
    }

    pub fn warnings(&self) -> Vec<String> {
        snapshot(&self.warnings)
    }

    pub fn fatals(&self) -> Vec<String> {
        snapshot(&self.fatals)
    }

    /// Whether any status line contains `needle`.
    pub fn has_status(&self, needle: &str) -> bool {
        self.statuses().iter().any(|s| s.contains(needle))
    }
}

fn snapshot(messages: &Mutex<Vec<String>>) -> Vec<String> {
    messages.lock().map(|m| m.clone()).unwrap_or_default()
}

fn push(messages: &Mutex<Vec<String>>, message: String) {
    if let Ok(mut messages) = messages.lock() {
        messages.push(message);
    }
}

impl Reporter for RecordingReporter {
    fn status(&self, message: &str) {
        push(&self.statuses, message.to_string());
    }

    fn warn(&self, message: &str) {
        push(&self.warnings, message.to_string());
    }

    fn fatal(&self, message: &str, detail: &dyn std::error::Error) {
        push(&self.fatals, format!("{}: {}", message, detail));
    }
}
