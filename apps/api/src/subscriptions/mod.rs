//! Live document subscriptions and the permission-error channel.
//!
//! A [`DocumentSource`] produces snapshot streams for a collection or a single
//! document. [`Subscriber`] turns them into typed updates, and every
//! permission denial is published on the [`ErrorPublisher`] it was built with.

#![allow(dead_code)]

pub mod memory;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub use memory::InMemoryDocumentSource;

const ERROR_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Collection(String),
    Document(String),
}

impl Query {
    pub fn path(&self) -> &str {
        match self {
            Query::Collection(path) | Query::Document(path) => path,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Query::Collection(_) => Operation::List,
            Query::Document(_) => Operation::Get,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("missing or insufficient permissions")]
    PermissionDenied,

    #[error("document source unavailable: {0}")]
    Unavailable(String),
}

/// One result per change. Document queries yield zero or one document.
pub type SnapshotStream = BoxStream<'static, Result<Vec<Document>, SubscriptionError>>;

pub trait DocumentSource: Send + Sync {
    fn listen(&self, query: &Query) -> SnapshotStream;
}

/// A denied read, with the path and operation that caused it.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("Missing or insufficient permissions: {operation} on {path}")]
pub struct PermissionError {
    pub path: String,
    pub operation: Operation,
    pub occurred_at: DateTime<Utc>,
}

/// Broadcast channel for [`PermissionError`]s. Clones share the channel.
#[derive(Debug, Clone)]
pub struct ErrorPublisher {
    sender: broadcast::Sender<PermissionError>,
}

impl Default for ErrorPublisher {
    fn default() -> Self {
        Self::new(ERROR_CHANNEL_CAPACITY)
    }
}

impl ErrorPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns how many listeners received the error. Zero is not a failure.
    pub fn publish(&self, error: PermissionError) -> usize {
        self.sender.send(error).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PermissionError> {
        self.sender.subscribe()
    }
}

/// Logs every published permission error until the channel closes.
pub fn spawn_error_listener(publisher: &ErrorPublisher) -> JoinHandle<()> {
    let mut receiver = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(err) => error!(
                    path = %err.path,
                    operation = %err.operation,
                    occurred_at = %err.occurred_at,
                    "{err}"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Permission error listener skipped {skipped} error(s)")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Permission error listener stopped");
    })
}

pub type CollectionUpdates = BoxStream<'static, Result<Vec<Document>, SubscriptionError>>;
pub type DocumentUpdates = BoxStream<'static, Result<Option<Document>, SubscriptionError>>;

#[derive(Clone)]
pub struct Subscriber {
    source: Arc<dyn DocumentSource>,
    errors: ErrorPublisher,
}

impl Subscriber {
    pub fn new(source: Arc<dyn DocumentSource>, errors: ErrorPublisher) -> Self {
        Self { source, errors }
    }

    pub fn subscribe_collection(&self, path: &str) -> CollectionUpdates {
        self.listen(Query::Collection(path.to_string())).boxed()
    }

    pub fn subscribe_document(&self, path: &str) -> DocumentUpdates {
        self.listen(Query::Document(path.to_string()))
            .map(|result| result.map(|docs| docs.into_iter().next()))
            .boxed()
    }

    fn listen(&self, query: Query) -> SnapshotStream {
        let errors = self.errors.clone();
        self.source
            .listen(&query)
            .inspect(move |result| {
                if let Err(SubscriptionError::PermissionDenied) = result {
                    errors.publish(PermissionError {
                        path: query.path().to_string(),
                        operation: query.operation(),
                        occurred_at: Utc::now(),
                    });
                }
            })
            .boxed()
    }
}
