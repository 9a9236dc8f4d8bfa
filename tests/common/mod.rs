//! Common test utilities for query tests
//!
//! Provides shared helpers for:
//! - A recording in-memory session returning canned result sets
//! - Document fixtures registered against a default store
//! - Building result rows

#![allow(dead_code)]

use async_trait::async_trait;
use docql::{
    Command, DbResult, Document, DocumentMappingBuilder, DocumentStore, QueryEnum, QuerySession,
    ResultSet, Row, Session, SqlValue, StoreOptions, TempTableNames, ValueType,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Session that records every command and replies with queued result sets
pub struct RecordingSession {
    names: TempTableNames,
    tenant: String,
    replies: Mutex<VecDeque<Vec<ResultSet>>>,
    commands: Mutex<Vec<Command>>,
    delay: Option<Duration>,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::for_tenant("tenant-a")
    }

    pub fn for_tenant(tenant: &str) -> Self {
        Self {
            names: TempTableNames::new("mt_temp_id_list"),
            tenant: tenant.to_string(),
            replies: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering, so a cancellation can win
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reply(&self, results: Vec<ResultSet>) {
        self.replies.lock().push_back(results);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    pub fn last_command(&self) -> Command {
        self.commands
            .lock()
            .last()
            .cloned()
            .expect("no command executed")
    }
}

#[async_trait]
impl Session for RecordingSession {
    fn next_temp_table_name(&self) -> String {
        self.names.next_name()
    }

    fn tenant_id(&self) -> &str {
        &self.tenant
    }

    async fn execute(&self, command: &Command) -> DbResult<Vec<ResultSet>> {
        self.commands.lock().push(command.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.replies.lock().pop_front().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Colors {
    Red,
    Blue,
    Green,
}

impl QueryEnum for Colors {
    fn variants() -> &'static [Self] {
        &[Colors::Red, Colors::Blue, Colors::Green]
    }

    fn name(&self) -> &'static str {
        match self {
            Colors::Red => "Red",
            Colors::Blue => "Blue",
            Colors::Green => "Green",
        }
    }

    fn ordinal(&self) -> i64 {
        *self as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Target {
    pub id: Uuid,
    pub number: i32,
    pub long: i64,
    pub string: String,
    pub flag: bool,
    pub color: Colors,
    pub tags: Vec<String>,
}

impl Document for Target {
    fn configure(mapping: DocumentMappingBuilder) -> DocumentMappingBuilder {
        mapping
            .field("Number", ValueType::Int)
            .field("Long", ValueType::BigInt)
            .field("String", ValueType::Text)
            .field("Flag", ValueType::Bool)
            .enumeration("Color")
            .collection("Tags", ValueType::Text)
            .child("Inner", |inner| inner.field("Number", ValueType::Int))
            .document_collection("Children", |child| {
                child
                    .field("Number", ValueType::Int)
                    .field("String", ValueType::Text)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    pub number: i32,
    pub assignee_id: Option<Uuid>,
}

impl Document for Issue {
    fn configure(mapping: DocumentMappingBuilder) -> DocumentMappingBuilder {
        mapping
            .field("Title", ValueType::Text)
            .field("Number", ValueType::Int)
            .field("AssigneeId", ValueType::Uuid)
            .soft_deleted()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    pub id: Uuid,
    pub user_name: String,
}

impl Document for User {
    fn configure(mapping: DocumentMappingBuilder) -> DocumentMappingBuilder {
        mapping.field("UserName", ValueType::Text).conjoined_tenancy()
    }
}

pub fn target(number: i32, string: &str) -> Target {
    Target {
        id: Uuid::new_v4(),
        number,
        long: number as i64,
        string: string.to_string(),
        flag: number % 2 == 0,
        color: Colors::Blue,
        tags: vec!["a".to_string(), "b".to_string()],
    }
}

pub fn issue(number: i32, title: &str) -> Issue {
    Issue {
        id: Uuid::new_v4(),
        title: title.to_string(),
        number,
        assignee_id: None,
    }
}

pub fn document_row<T: Serialize>(document: &T) -> Row {
    vec![SqlValue::Json(serde_json::to_value(document).expect("serializable fixture"))]
}

/// Row of a statement that carries the `total_rows` column
pub fn document_row_with_total<T: Serialize>(document: &T, total: i64) -> Row {
    let mut row = document_row(document);
    row.push(SqlValue::Int(total));
    row
}

pub fn documents<T: Serialize>(documents: &[T]) -> ResultSet {
    ResultSet::new(vec!["data"], documents.iter().map(document_row).collect())
}

pub fn scalar(value: SqlValue) -> ResultSet {
    ResultSet::new(vec!["data"], vec![vec![value]])
}

pub fn user_json(name: &str) -> serde_json::Value {
    json!({ "Id": Uuid::new_v4(), "UserName": name })
}

pub fn store() -> Arc<DocumentStore> {
    store_with(StoreOptions::default())
}

pub fn store_with(options: StoreOptions) -> Arc<DocumentStore> {
    init_tracing();
    Arc::new(DocumentStore::new(options))
}

/// A query session over a fresh recording session
pub fn open(store: &Arc<DocumentStore>) -> (QuerySession, Arc<RecordingSession>) {
    let session = Arc::new(RecordingSession::new());
    (store.query_session(session.clone()), session)
}
