//! Category loading with caching and in-flight deduplication
//!
//! [`CategoryLoader`] is the entry point the front end talks to. A load checks
//! the expiring cache, then joins any fetch already running for the same
//! category, and only then goes to the network. Fetched documents are enhanced
//! once and cached in their enhanced form.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{ExpiringCache, KeyValueStore};
use crate::config::LoaderConfig;
use crate::content::enhance_payload;
use crate::data::{CategoryClient, CategoryPayload, LoadError, Topic};

/// Result every waiter on a fetch receives
type LoadResult = Result<Arc<CategoryPayload>, LoadError>;

/// A fetch that any number of callers can await
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;

/// Registration of a running fetch
///
/// The token tells a settling fetch whether its registration is still the
/// current one, or whether it was dropped by `clear_cache` and possibly
/// replaced by a newer fetch for the same key.
struct InFlight {
    token: u64,
    load: SharedLoad,
}

type Registry = Arc<Mutex<HashMap<String, InFlight>>>;

/// Hooks for a UI that shows progress around a full load
///
/// All methods default to doing nothing.
pub trait LoadObserver: Send + Sync {
    /// A long-running load has started
    fn show_loading(&self, _message: &str) {}

    /// The load has finished, successfully or not
    fn hide_loading(&self) {}

    /// Nothing usable could be loaded
    fn show_error(&self, _message: &str) {}
}

/// Outcome of loading every configured category
#[derive(Debug, Clone, Default)]
pub struct CategoryCollection {
    /// Categories that loaded, by category ID
    pub loaded: BTreeMap<String, Arc<CategoryPayload>>,
    /// Categories that failed, with the reason
    pub failed: BTreeMap<String, LoadError>,
}

impl CategoryCollection {
    /// Flattens every loaded payload into one category → topics mapping
    pub fn merged(&self) -> CategoryPayload {
        let mut merged: BTreeMap<String, Vec<Topic>> = BTreeMap::new();
        for payload in self.loaded.values() {
            for (category, topics) in payload.iter() {
                merged.insert(category.clone(), topics.clone());
            }
        }
        merged
    }

    /// Returns true if at least one category failed
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Loads category documents through the cache, sharing concurrent fetches
///
/// Construct one per process and pass it by reference to whatever needs data.
pub struct CategoryLoader {
    config: LoaderConfig,
    client: CategoryClient,
    cache: Arc<ExpiringCache<CategoryPayload>>,
    in_flight: Registry,
    next_token: AtomicU64,
}

impl CategoryLoader {
    /// Creates a loader whose cache is persisted in `store`
    ///
    /// The cache is hydrated from `store` immediately.
    ///
    /// # Returns
    /// * `Err(LoadError::InvalidConfig)` if the configuration is unusable
    pub fn new(config: LoaderConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, LoadError> {
        config.validate()?;
        let client = CategoryClient::new(&config)?;
        let cache = ExpiringCache::new(store, config.cache_namespace.clone(), config.cache_ttl);

        Ok(Self {
            config,
            client,
            cache: Arc::new(cache),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(0),
        })
    }

    /// The configuration this loader was built with
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Cache key for a category under the configured format version
    pub fn cache_key(&self, category: &str) -> String {
        format!("category_{}_v{}", category, self.config.format_version)
    }

    /// When the category was cached, if a fresh entry exists
    pub fn cached_at(&self, category: &str) -> Option<DateTime<Utc>> {
        self.cache.cached_at(&self.cache_key(category))
    }

    /// Loads one category
    ///
    /// # Behavior
    /// - Returns the cached payload if it is fresh (no network call)
    /// - Otherwise joins a fetch already running for this category
    /// - Otherwise fetches `{base_url}/{category}.json`, enhances it, caches
    ///   it and returns it
    ///
    /// Every caller that joined a fetch gets the same result, success or
    /// failure. Failures are never cached, so the next call fetches again.
    pub async fn load_category(&self, category: &str) -> LoadResult {
        let key = self.cache_key(category);

        let load = {
            let mut in_flight = self.in_flight.lock();

            if let Some(hit) = self.cache.get(&key) {
                debug!(category, key = %key, "cache hit");
                return Ok(hit);
            }

            match in_flight.get(&key) {
                Some(entry) => {
                    debug!(category, key = %key, "joining in-flight fetch");
                    entry.load.clone()
                }
                None => {
                    let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                    let load = self.start_load(category, key.clone(), token);
                    in_flight.insert(
                        key,
                        InFlight {
                            token,
                            load: load.clone(),
                        },
                    );
                    load
                }
            }
        };

        load.await
    }

    /// Builds the shared fetch for one category
    ///
    /// Settling the fetch writes the cache and drops the registration under
    /// the registry lock, so a later caller sees either one or the other.
    fn start_load(&self, category: &str, key: String, token: u64) -> SharedLoad {
        let client = self.client.clone();
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let category = category.to_string();

        async move {
            let fetched = client.fetch_category(&category).await.map(enhance_payload);

            let mut registry = in_flight.lock();
            let current = registry
                .get(&key)
                .is_some_and(|entry| entry.token == token);
            if current {
                registry.remove(&key);
            }

            match fetched {
                Ok(payload) if current => {
                    info!(category = %category, "category loaded");
                    Ok(cache.set(&key, payload))
                }
                Ok(payload) => {
                    debug!(category = %category, "cache cleared during fetch, not caching");
                    Ok(Arc::new(payload))
                }
                Err(e) => {
                    warn!(category = %category, error = %e, "failed to load category");
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Loads every configured category concurrently
    ///
    /// A failing category is logged and recorded in
    /// [`CategoryCollection::failed`]; it never aborts the others.
    pub async fn load_all_categories(&self) -> CategoryCollection {
        let loads = self.config.categories.iter().map(|category| async move {
            let result = self.load_category(category).await;
            (category.clone(), result)
        });
        let results = futures::future::join_all(loads).await;

        let mut collection = CategoryCollection::default();
        for (category, result) in results {
            match result {
                Ok(payload) => {
                    collection.loaded.insert(category, payload);
                }
                Err(e) => {
                    warn!(category = %category, error = %e, "skipping category");
                    collection.failed.insert(category, e);
                }
            }
        }

        info!(
            loaded = collection.loaded.len(),
            failed = collection.failed.len(),
            "finished loading categories"
        );
        collection
    }

    /// Loads everything for the front end, reporting progress to `observer`
    ///
    /// # Returns
    /// * `Ok(CategoryCollection)` if at least one category loaded
    /// * `Err(LoadError::NothingLoaded)` if every category failed
    pub async fn load_app_data(
        &self,
        observer: &dyn LoadObserver,
    ) -> Result<CategoryCollection, LoadError> {
        observer.show_loading("Loading learning content...");
        let collection = self.load_all_categories().await;
        observer.hide_loading();

        if collection.loaded.is_empty() {
            observer.show_error("Could not load any content. Check your internet connection.");
            return Err(LoadError::NothingLoaded);
        }

        Ok(collection)
    }

    /// Empties the cache and forgets every running fetch
    ///
    /// Fetches already running still resolve for their callers, but their
    /// results are not cached.
    pub fn clear_cache(&self) {
        let mut in_flight = self.in_flight.lock();
        in_flight.clear();
        self.cache.clear();
        info!("cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::data::Markup;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body_for(category: &str) -> String {
        format!(
            r#"{{"{category}": [{{"title": "Topik {category}", "summary": "Setengah = 1/2", "questions": [{{"q": "[img:img/2/3.png|Gambar]", "a": "3/4"}}]}}]}}"#
        )
    }

    fn ok_response(category: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(body_for(category))
    }

    fn test_config(server: &MockServer) -> LoaderConfig {
        LoaderConfig::default()
            .with_base_url(server.uri())
            .with_cache_bust(false)
            .with_request_timeout(Duration::from_secs(5))
    }

    fn test_loader(config: LoaderConfig) -> (CategoryLoader, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let loader = CategoryLoader::new(config, store.clone()).expect("Loader should build");
        (loader, store)
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl LoadObserver for RecordingObserver {
        fn show_loading(&self, message: &str) {
            self.events.lock().push(format!("loading: {}", message));
        }
        fn hide_loading(&self) {
            self.events.lock().push("hide".to_string());
        }
        fn show_error(&self, message: &str) {
            self.events.lock().push(format!("error: {}", message));
        }
    }

    #[test]
    fn test_cache_key_includes_format_version() {
        let config = LoaderConfig::default().with_format_version("9.9");
        let (loader, _store) = test_loader(config);
        assert_eq!(loader.cache_key("math"), "category_math_v9.9");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = LoaderConfig::default().with_categories(Vec::<String>::new());
        let result = CategoryLoader::new(config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(LoadError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/math.json"))
            .respond_with(ok_response("math").set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let (loader, _store) = test_loader(test_config(&server));
        let (first, second) = tokio::join!(
            loader.load_category("math"),
            loader.load_category("math")
        );

        let first = first.expect("First load should succeed");
        let second = second.expect("Second load should succeed");
        assert!(Arc::ptr_eq(&first, &second), "Both callers should get the same payload");
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_shared() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let (loader, _store) = test_loader(test_config(&server));
        let (first, second) = tokio::join!(
            loader.load_category("ipa"),
            loader.load_category("ipa")
        );

        let expected = LoadError::HttpStatus {
            status: 503,
            reason: "Service Unavailable".to_string(),
        };
        assert_eq!(first, Err(expected.clone()));
        assert_eq!(second, Err(expected));
    }

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo.json"))
            .respond_with(ok_response("geo"))
            .expect(1)
            .mount(&server)
            .await;

        let (loader, _store) = test_loader(test_config(&server));
        assert!(loader.cached_at("geo").is_none());

        let first = loader.load_category("geo").await.expect("Should load");
        let second = loader.load_category("geo").await.expect("Should hit cache");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(loader.cached_at("geo").is_some());
    }

    #[tokio::test]
    async fn test_loaded_payload_is_enhanced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_response("math"))
            .mount(&server)
            .await;

        let (loader, _store) = test_loader(test_config(&server));
        let payload = loader.load_category("math").await.expect("Should load");
        let topic = &payload["math"][0];

        let summary = topic.summary.as_ref().and_then(Markup::as_text).expect("Summary");
        assert!(summary.contains("<span class=\"numerator\">1</span>"));

        let q = topic.questions[0].q.as_text().expect("Question");
        assert!(q.contains("src=\"img/2/3.png\""));
        assert!(!q.contains("vertical-fraction"), "URL digits must not become a fraction");

        let a = topic.questions[0].a.as_text().expect("Answer");
        assert!(a.contains("<span class=\"denominator\">4</span>"));
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ok_response("seni"))
            .expect(1)
            .mount(&server)
            .await;

        let (loader, _store) = test_loader(test_config(&server));

        let first = loader.load_category("seni").await;
        assert!(matches!(first, Err(LoadError::HttpStatus { status: 500, .. })));
        assert!(loader.cached_at("seni").is_none());

        let second = loader.load_category("seni").await;
        assert!(second.is_ok(), "Retry should fetch again and succeed");
    }

    #[tokio::test]
    async fn test_missing_category_key_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"other": []}"#))
            .mount(&server)
            .await;

        let (loader, _store) = test_loader(test_config(&server));
        let result = loader.load_category("dunia").await;

        assert!(matches!(result, Err(LoadError::Parse(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_response("math").set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let config = test_config(&server).with_request_timeout(Duration::from_millis(50));
        let (loader, _store) = test_loader(config);
        let result = loader.load_category("math").await;

        assert!(matches!(result, Err(LoadError::Network(_))), "got {:?}", result);
        assert!(loader.cached_at("math").is_none());
    }

    #[tokio::test]
    async fn test_cache_persists_across_loader_instances() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_response("agama"))
            .expect(1)
            .mount(&server)
            .await;

        let (first_loader, store) = test_loader(test_config(&server));
        first_loader.load_category("agama").await.expect("Should load");
        drop(first_loader);

        let second_loader =
            CategoryLoader::new(test_config(&server), store).expect("Loader should build");
        let payload = second_loader
            .load_category("agama")
            .await
            .expect("Should load from persisted cache");

        assert_eq!(payload["agama"][0].title, "Topik agama");
    }

    #[tokio::test]
    async fn test_format_version_change_invalidates_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_response("indo"))
            .expect(2)
            .mount(&server)
            .await;

        let (old_loader, store) = test_loader(test_config(&server).with_format_version("1.0.0"));
        old_loader.load_category("indo").await.expect("Should load");

        let new_loader = CategoryLoader::new(
            test_config(&server).with_format_version("2.0.0"),
            store,
        )
        .expect("Loader should build");
        new_loader.load_category("indo").await.expect("Should fetch again");
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_response("english"))
            .expect(2)
            .mount(&server)
            .await;

        let (loader, store) = test_loader(test_config(&server));
        loader.load_category("english").await.expect("Should load");

        loader.clear_cache();
        assert!(store
            .read(&loader.config().cache_namespace)
            .expect("Read should succeed")
            .is_none());

        loader.load_category("english").await.expect("Should fetch again");
    }

    #[tokio::test]
    async fn test_clear_cache_during_fetch_does_not_cache_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_response("sejarah").set_delay(Duration::from_millis(200)))
            .expect(2)
            .mount(&server)
            .await;

        let (loader, _store) = test_loader(test_config(&server));
        let (result, _) = tokio::join!(loader.load_category("sejarah"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            loader.clear_cache();
        });

        assert!(result.is_ok(), "The running fetch still resolves");
        assert!(loader.cached_at("sejarah").is_none());

        loader
            .load_category("sejarah")
            .await
            .expect("A fresh fetch should run after the clear");
        assert!(loader.cached_at("sejarah").is_some());
    }

    #[tokio::test]
    async fn test_load_all_tolerates_partial_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.json"))
            .respond_with(ok_response("a"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.json"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/c.json"))
            .respond_with(ok_response("c"))
            .mount(&server)
            .await;

        let config = test_config(&server).with_categories(["a", "b", "c"]);
        let (loader, _store) = test_loader(config);
        let collection = loader.load_all_categories().await;

        assert_eq!(
            collection.loaded.keys().cloned().collect::<Vec<_>>(),
            vec!["a".to_string(), "c".to_string()]
        );
        assert!(collection.has_failures());
        assert!(matches!(
            collection.failed.get("b"),
            Some(LoadError::HttpStatus { status: 500, .. })
        ));

        let merged = collection.merged();
        assert!(merged.contains_key("a"));
        assert!(merged.contains_key("c"));
        assert!(!merged.contains_key("b"));
    }

    #[tokio::test]
    async fn test_load_app_data_reports_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ok_response("math"))
            .mount(&server)
            .await;

        let config = test_config(&server).with_categories(["math"]);
        let (loader, _store) = test_loader(config);
        let observer = RecordingObserver::default();

        let collection = loader
            .load_app_data(&observer)
            .await
            .expect("Should load");

        assert_eq!(collection.loaded.len(), 1);
        let events = observer.events.lock();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("loading: "));
        assert_eq!(events[1], "hide");
    }

    #[tokio::test]
    async fn test_load_app_data_fails_when_nothing_loads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let config = test_config(&server).with_categories(["x", "y"]);
        let (loader, _store) = test_loader(config);
        let observer = RecordingObserver::default();

        let result = loader.load_app_data(&observer).await;

        assert!(matches!(result, Err(LoadError::NothingLoaded)));
        let events = observer.events.lock();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], "hide");
        assert!(events[2].starts_with("error: "));
    }
}
