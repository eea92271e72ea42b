//! crates/training_core/src/search.rs
//!
//! Search-as-you-type over the exercise catalog. Keystrokes are debounced so a
//! burst of input produces one store query, and results are only published while
//! the query that produced them is still the latest input.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::domain::Exercise;
use crate::ports::{Collection, PortResult, RecordStore};
use crate::query::{Filter, ListQuery};

pub const QUIET_PERIOD: Duration = Duration::from_millis(300);
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_RESULTS: u32 = 10;

/// Looks up exercises whose primary or localized name contains `query`.
/// Queries shorter than two characters return nothing without touching the store.
pub async fn search_exercises(store: &dyn RecordStore, query: &str) -> PortResult<Vec<Exercise>> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_CHARS {
        return Ok(Vec::new());
    }

    let list = ListQuery::new()
        .per_page(MAX_RESULTS)
        .filter(Filter::like("name", query).or(Filter::like("nameNO", query)))
        .sort_asc("name");
    store
        .get_list(Collection::Exercises, &list)
        .await?
        .items
        .iter()
        .map(|record| record.decode())
        .collect()
}

/// Results keyed by the query text that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub exercises: Vec<Exercise>,
}

/// A background debouncer feeding `search_exercises`. Dropping it stops the task.
pub struct DebouncedSearch {
    input: watch::Sender<String>,
    results: watch::Receiver<SearchResults>,
    shutdown: CancellationToken,
}

impl DebouncedSearch {
    pub fn spawn(store: Arc<dyn RecordStore>, quiet_period: Duration) -> Self {
        let (input_tx, input_rx) = watch::channel(String::new());
        let (results_tx, results_rx) = watch::channel(SearchResults::default());
        let shutdown = CancellationToken::new();

        tokio::spawn(debounce_loop(
            store,
            quiet_period,
            input_rx,
            results_tx,
            shutdown.clone(),
        ));

        Self {
            input: input_tx,
            results: results_rx,
            shutdown,
        }
    }

    /// Records the latest text of the search box.
    pub fn input(&self, text: impl Into<String>) {
        self.input.send_replace(text.into());
    }

    /// A receiver notified whenever fresh results are published.
    pub fn results(&self) -> watch::Receiver<SearchResults> {
        self.results.clone()
    }
}

impl Drop for DebouncedSearch {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn debounce_loop(
    store: Arc<dyn RecordStore>,
    quiet_period: Duration,
    mut input: watch::Receiver<String>,
    results: watch::Sender<SearchResults>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            changed = input.changed() => if changed.is_err() { return },
        }

        // Wait until the input has been quiet for a full period.
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(quiet_period) => break,
                changed = input.changed() => if changed.is_err() { return },
            }
        }

        let query = input.borrow_and_update().clone();
        if query.trim().chars().count() < MIN_QUERY_CHARS {
            continue;
        }

        debug!("Searching exercises for '{}'", query);
        match search_exercises(store.as_ref(), &query).await {
            Ok(exercises) => {
                if *input.borrow() != query {
                    debug!("Discarding stale results for '{}'", query);
                    continue;
                }
                results.send_replace(SearchResults { query, exercises });
            }
            Err(e) => error!("Error fetching exercises for '{}': {}", query, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryRecordStore;
    use crate::ports::{PortError, Record, RecordPage};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Records every list call before delegating to the in-memory store, which
    /// answers lists only after `latency`.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryRecordStore,
        filters: Mutex<Vec<String>>,
        latency: Duration,
    }

    #[async_trait]
    impl RecordStore for RecordingStore {
        async fn create(&self, collection: Collection, fields: Value) -> PortResult<Record> {
            self.inner.create(collection, fields).await
        }

        async fn update(&self, c: Collection, id: &str, fields: Value) -> PortResult<Record> {
            self.inner.update(c, id, fields).await
        }

        async fn delete(&self, collection: Collection, id: &str) -> PortResult<()> {
            self.inner.delete(collection, id).await
        }

        async fn get_one(&self, c: Collection, id: &str, expand: &[&str]) -> PortResult<Record> {
            self.inner.get_one(c, id, expand).await
        }

        async fn get_list(&self, c: Collection, query: &ListQuery) -> PortResult<RecordPage> {
            self.filters
                .lock()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .push(query.render_filter().unwrap_or_default());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.inner.get_list(c, query).await
        }
    }

    async fn catalog() -> Arc<RecordingStore> {
        catalog_with_latency(Duration::ZERO).await
    }

    async fn catalog_with_latency(latency: Duration) -> Arc<RecordingStore> {
        let store = Arc::new(RecordingStore {
            latency,
            ..RecordingStore::default()
        });
        for (name, name_no) in [
            ("Barbell Squat", "Knebøy"),
            ("Goblet Squat", "Goblet knebøy"),
            ("Bench Press", "Benkpress"),
            ("Abdominal Crunch", "Situps"),
        ] {
            store
                .create(Collection::Exercises, json!({ "name": name, "nameNO": name_no }))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn matches_either_name_sorted_and_capped() {
        let store = catalog().await;

        let hits = search_exercises(store.as_ref(), "squat").await.unwrap();
        let names: Vec<_> = hits.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Barbell Squat", "Goblet Squat"]);

        let hits = search_exercises(store.as_ref(), "benk").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Bench Press");

        for i in 0..12 {
            store
                .create(Collection::Exercises, json!({ "name": format!("Row {:02}", i) }))
                .await
                .unwrap();
        }
        let hits = search_exercises(store.as_ref(), "row").await.unwrap();
        assert_eq!(hits.len(), MAX_RESULTS as usize);
    }

    #[tokio::test]
    async fn short_queries_skip_the_store() {
        let store = catalog().await;
        assert!(search_exercises(store.as_ref(), "a").await.unwrap().is_empty());
        assert!(store.filters.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_input_triggers_one_search_for_the_last_text() {
        let store = catalog().await;
        let search = DebouncedSearch::spawn(store.clone(), QUIET_PERIOD);
        let mut results = search.results();

        search.input("a");
        tokio::time::sleep(Duration::from_millis(100)).await;
        search.input("ab");
        tokio::time::sleep(Duration::from_millis(100)).await;
        search.input("abc");

        results.changed().await.unwrap();
        let published = results.borrow_and_update().clone();
        assert_eq!(published.query, "abc");

        let filters = store.filters.lock().unwrap().clone();
        assert_eq!(filters.len(), 1);
        assert!(filters[0].contains("'abc'"));
    }

    #[tokio::test(start_paused = true)]
    async fn single_character_never_reaches_the_store() {
        let store = catalog().await;
        let search = DebouncedSearch::spawn(store.clone(), QUIET_PERIOD);

        search.input("s");
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(store.filters.lock().unwrap().is_empty());
        assert_eq!(search.results().borrow().query, "");
    }

    #[tokio::test(start_paused = true)]
    async fn separate_pauses_publish_each_query() {
        let store = catalog().await;
        let search = DebouncedSearch::spawn(store.clone(), QUIET_PERIOD);
        let mut results = search.results();

        search.input("squat");
        results.changed().await.unwrap();
        assert_eq!(results.borrow_and_update().exercises.len(), 2);

        search.input("press");
        results.changed().await.unwrap();
        let latest = results.borrow_and_update().clone();
        assert_eq!(latest.query, "press");
        assert_eq!(latest.exercises[0].name, "Bench Press");
        assert_eq!(store.filters.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn results_of_a_superseded_query_are_discarded() {
        let store = catalog_with_latency(Duration::from_millis(500)).await;
        let search = DebouncedSearch::spawn(store.clone(), QUIET_PERIOD);
        let mut results = search.results();

        // "squat" goes out at 300 ms and answers at 800 ms; the box changes at 400 ms.
        search.input("squat");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.filters.lock().unwrap().len(), 1);
        search.input("press");

        results.changed().await.unwrap();
        let first = results.borrow_and_update().clone();
        assert_eq!(first.query, "press");
        assert_eq!(first.exercises.len(), 1);
        assert_eq!(first.exercises[0].name, "Bench Press");

        let filters = store.filters.lock().unwrap().clone();
        assert_eq!(filters.len(), 2);
        assert!(filters[0].contains("'squat'"));
        assert!(filters[1].contains("'press'"));
    }
}
