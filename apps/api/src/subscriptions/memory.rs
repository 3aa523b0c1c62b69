//! In-process [`DocumentSource`] for local development and tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::watch;

use super::{Document, DocumentSource, Query, SnapshotStream, SubscriptionError};

#[derive(Default)]
struct Store {
    collections: HashMap<String, BTreeMap<String, Value>>,
    denied: HashSet<String>,
}

impl Store {
    fn snapshot(&self, query: &Query) -> Result<Vec<Document>, SubscriptionError> {
        if self.denied.contains(query.path()) {
            return Err(SubscriptionError::PermissionDenied);
        }

        let documents = match query {
            Query::Collection(path) => self
                .collections
                .get(path)
                .map(|docs| {
                    docs.iter()
                        .map(|(id, data)| Document {
                            id: id.clone(),
                            data: data.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Query::Document(path) => {
                let Some((collection, id)) = path.rsplit_once('/') else {
                    return Err(SubscriptionError::Unavailable(format!(
                        "'{path}' is not a document path"
                    )));
                };
                self.collections
                    .get(collection)
                    .and_then(|docs| docs.get(id))
                    .map(|data| Document {
                        id: id.to_string(),
                        data: data.clone(),
                    })
                    .into_iter()
                    .collect()
            }
        };
        Ok(documents)
    }
}

/// Collections of JSON documents keyed by id. Every write wakes all open
/// streams, which then re-read their query.
#[derive(Clone)]
pub struct InMemoryDocumentSource {
    store: Arc<Mutex<Store>>,
    changes: watch::Sender<u64>,
}

impl Default for InMemoryDocumentSource {
    fn default() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            changes,
        }
    }
}

impl InMemoryDocumentSource {
    pub fn set(&self, collection: &str, id: &str, data: Value) {
        self.store()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        self.notify();
    }

    pub fn delete(&self, collection: &str, id: &str) {
        if let Some(docs) = self.store().collections.get_mut(collection) {
            docs.remove(id);
        }
        self.notify();
    }

    /// Denies every read of `path` from now on.
    pub fn deny(&self, path: &str) {
        self.store().denied.insert(path.to_string());
        self.notify();
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version += 1);
    }
}

impl DocumentSource for InMemoryDocumentSource {
    fn listen(&self, query: &Query) -> SnapshotStream {
        let store = Arc::clone(&self.store);
        let changes = self.changes.subscribe();
        let query = query.clone();

        // State: (change receiver, first snapshot pending, stream finished).
        stream::unfold((changes, true, false), move |(mut changes, first, done)| {
            let store = Arc::clone(&store);
            let query = query.clone();
            async move {
                if done {
                    return None;
                }
                if !first && changes.changed().await.is_err() {
                    return None;
                }
                let snapshot = store
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .snapshot(&query);
                let finished = snapshot.is_err();
                Some((snapshot, (changes, false, finished)))
            }
        })
        .boxed()
    }
}
