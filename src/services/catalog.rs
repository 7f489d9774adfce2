use crate::error::{ApiError, Result};
use crate::models::{BookRecord, Place, StoreDocument};
use crate::services::geo;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Read-only document source for catalog records.
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn list_books(&self) -> Result<Vec<StoreDocument>>;
}

/// REST document store client (PostgREST-style endpoints).
#[derive(Debug, Clone)]
pub struct RestBookStore {
    client: Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl RestBookStore {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl BookStore for RestBookStore {
    async fn list_books(&self) -> Result<Vec<StoreDocument>> {
        let url = format!("{}/rest/v1/{}?select=*", self.base_url, self.table);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ApiError::StoreError(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| ApiError::SerializationError(e.to_string())),
            status => Err(ApiError::StoreError(format!(
                "Unexpected status code: {}",
                status
            ))),
        }
    }
}

/// An immutable view of the catalog at a point in time.
///
/// Replaced wholesale on refresh, never patched.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub books: Vec<Arc<BookRecord>>,
    pub by_id: HashMap<String, Arc<BookRecord>>,
    pub available_countries: Vec<Place>,
}

impl CatalogSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index raw documents into a snapshot.
    ///
    /// Documents without an id cannot be recommended and are skipped.
    pub fn index(docs: Vec<StoreDocument>) -> Self {
        let mut books = Vec::with_capacity(docs.len());
        let mut by_id = HashMap::with_capacity(docs.len());

        for doc in docs {
            if doc.id.is_empty() {
                continue;
            }
            let record = Arc::new(BookRecord::from_document(doc));
            by_id.insert(record.id.clone(), Arc::clone(&record));
            books.push(record);
        }

        let mut iso_codes: BTreeSet<String> = BTreeSet::new();
        for book in &books {
            iso_codes.extend(book.iso2_sets.any.iter().cloned());
        }

        let available_countries = iso_codes
            .into_iter()
            .filter(|code| code.len() == 2)
            .map(|iso2| {
                let name = geo::name_for(&iso2);
                let name = if name.is_empty() { iso2.clone() } else { name };
                Place { iso2, name }
            })
            .collect();

        CatalogSnapshot {
            books,
            by_id,
            available_countries,
        }
    }
}

struct CacheState {
    snapshot: Arc<CatalogSnapshot>,
    refreshed_at: Option<Instant>,
}

/// TTL-bound snapshot cache with a stale-on-error policy.
///
/// A refresh failure keeps serving the previous snapshot; `get` never
/// surfaces an error. Concurrent refreshes are tolerated: all writers
/// compute the same snapshot from the same source, so last-writer-wins is
/// safe.
pub struct CatalogCache {
    store: Arc<dyn BookStore>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl CatalogCache {
    pub fn new(store: Arc<dyn BookStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: RwLock::new(CacheState {
                snapshot: Arc::new(CatalogSnapshot::empty()),
                refreshed_at: None,
            }),
        }
    }

    /// Current snapshot, refreshed when the TTL has expired.
    ///
    /// An empty snapshot is never considered fresh, so an unreachable store
    /// is retried on every call until it recovers.
    pub async fn get(&self) -> Arc<CatalogSnapshot> {
        if let Some(snapshot) = self.fresh_snapshot() {
            return snapshot;
        }

        match self.store.list_books().await {
            Ok(docs) => {
                let snapshot = Arc::new(CatalogSnapshot::index(docs));
                info!(
                    "catalog refreshed: books={} countries={}",
                    snapshot.books.len(),
                    snapshot.available_countries.len()
                );
                let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
                state.snapshot = Arc::clone(&snapshot);
                state.refreshed_at = Some(Instant::now());
                snapshot
            }
            Err(e) => {
                error!("catalog refresh failed, serving previous snapshot: {}", e);
                let state = self.state.read().unwrap_or_else(|e| e.into_inner());
                Arc::clone(&state.snapshot)
            }
        }
    }

    fn fresh_snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match state.refreshed_at {
            Some(at) if at.elapsed() < self.ttl && !state.snapshot.books.is_empty() => {
                Some(Arc::clone(&state.snapshot))
            }
            _ => None,
        }
    }
}
