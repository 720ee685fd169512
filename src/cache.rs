use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::favicon;
use crate::models::{
    sort_entries_newest_first, CachedFeedData, CategorizedFeeds, FeedCategory, FeedEntry,
    FeedMetadata,
};
use crate::parser::{FeedError, FeedParser, MAX_CONCURRENT_FETCHES};
use crate::source::FeedSource;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
/// Shorter retry window used when a rebuild produced nothing.
pub const DEGRADED_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheSlot {
    data: Arc<CachedFeedData>,
    expires_at: Instant,
}

/// Holds the one live [`CachedFeedData`] snapshot.
///
/// Readers get an `Arc` to the current snapshot and never block each other;
/// a rebuild assembles a fresh snapshot off to the side and swaps it in
/// whole. The rebuild mutex keeps at most one rebuild in flight: callers
/// that lose the race wait for the winner and reuse its result.
pub struct FeedCache {
    parser: FeedParser,
    source: Arc<dyn FeedSource>,
    slot: RwLock<Option<CacheSlot>>,
    rebuild_lock: Mutex<()>,
    rebuilding: AtomicBool,
    ttl: Duration,
    degraded_ttl: Duration,
}

impl FeedCache {
    pub fn new(parser: FeedParser, source: Arc<dyn FeedSource>) -> Self {
        Self::with_ttls(parser, source, DEFAULT_CACHE_TTL, DEGRADED_CACHE_TTL)
    }

    pub fn with_ttls(
        parser: FeedParser,
        source: Arc<dyn FeedSource>,
        ttl: Duration,
        degraded_ttl: Duration,
    ) -> Self {
        Self {
            parser,
            source,
            slot: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            rebuilding: AtomicBool::new(false),
            ttl,
            degraded_ttl,
        }
    }

    /// Current snapshot, rebuilding synchronously on miss or expiry.
    pub async fn get(&self) -> Arc<CachedFeedData> {
        if let Some(data) = self.fresh().await {
            return data;
        }

        let _guard = self.rebuild_lock.lock().await;
        // A rebuild that was in flight while we waited may have filled the
        // slot; reuse its result instead of fetching again.
        if let Some(data) = self.fresh().await {
            return data;
        }
        self.rebuild().await
    }

    /// Unconditionally rebuilds, expired or not.
    pub async fn refresh(&self) -> Arc<CachedFeedData> {
        info!("refreshing feed cache");
        let _guard = self.rebuild_lock.lock().await;
        self.rebuild().await
    }

    /// Whether a rebuild is currently in flight.
    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    async fn fresh(&self) -> Option<Arc<CachedFeedData>> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|s| s.expires_at > Instant::now())
            .map(|s| s.data.clone())
    }

    /// Caller must hold `rebuild_lock`.
    async fn rebuild(&self) -> Arc<CachedFeedData> {
        self.rebuilding.store(true, Ordering::SeqCst);
        let data = Arc::new(self.build_snapshot().await);
        self.rebuilding.store(false, Ordering::SeqCst);

        // An empty snapshot means the source was unreachable or every feed
        // failed; keep it short-lived so the next caller retries soon.
        let ttl = if data.all_entries.is_empty() {
            self.degraded_ttl
        } else {
            self.ttl
        };

        let mut slot = self.slot.write().await;
        *slot = Some(CacheSlot {
            data: data.clone(),
            expires_at: Instant::now() + ttl,
        });
        data
    }

    async fn build_snapshot(&self) -> CachedFeedData {
        let categorized = self.source.get_categorized_feeds();
        if categorized.categories.is_empty() {
            error!("feed source returned no categories, caching empty snapshot");
        }

        let pairs: Vec<(usize, usize, String, String)> = categorized
            .categories
            .iter()
            .enumerate()
            .flat_map(|(category_index, category)| {
                category
                    .feed_urls
                    .iter()
                    .enumerate()
                    .map(move |(position, url)| {
                        (category_index, position, category.name.clone(), url.clone())
                    })
            })
            .collect();

        let mut outcomes: Vec<FeedOutcome> = stream::iter(pairs)
            .map(|(category_index, position, category_name, feed_url)| {
                let parser = &self.parser;
                async move {
                    let result = parser
                        .try_parse_feed(&feed_url, Some(&category_name))
                        .await;
                    FeedOutcome {
                        category_index,
                        position,
                        feed_url,
                        result,
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        // Completion order back to feed-list order
        outcomes.sort_by_key(|o| (o.category_index, o.position));

        let now = Utc::now();
        let mut all_entries: Vec<FeedEntry> = Vec::new();
        let mut feed_metadata: HashMap<String, FeedMetadata> = HashMap::new();
        let mut working_urls: Vec<Vec<String>> = vec![Vec::new(); categorized.categories.len()];

        for outcome in outcomes {
            let url = outcome.feed_url;
            match outcome.result {
                Ok(entries) if !entries.is_empty() => {
                    let first = &entries[0];
                    feed_metadata.insert(
                        url.clone(),
                        FeedMetadata {
                            display_name: first.feed_display_name.clone(),
                            favicon_url: first.favicon_url.clone().unwrap_or_default(),
                            fallback_icon: first
                                .fallback_icon
                                .clone()
                                .unwrap_or_else(|| favicon::DEFAULT_ICON.to_string()),
                            is_working: true,
                            last_checked: now,
                            feed_url: url.clone(),
                        },
                    );
                    working_urls[outcome.category_index].push(url);
                    all_entries.extend(entries);
                }
                Ok(_) => {
                    warn!(feed = %url, "feed returned no entries");
                    feed_metadata.insert(url.clone(), broken_metadata(&url, favicon::DEFAULT_ICON));
                }
                Err(e) => {
                    warn!(feed = %url, error = %e, "failed to parse feed");
                    feed_metadata.insert(url.clone(), broken_metadata(&url, favicon::ERROR_ICON));
                }
            }
        }

        // A category survives only if at least one of its feeds works
        let working_feeds = CategorizedFeeds {
            categories: categorized
                .categories
                .iter()
                .zip(working_urls)
                .filter(|(_, urls)| !urls.is_empty())
                .map(|(category, feed_urls)| FeedCategory {
                    name: category.name.clone(),
                    feed_urls,
                })
                .collect(),
        };

        sort_entries_newest_first(&mut all_entries);

        info!(
            entries = all_entries.len(),
            working = feed_metadata.values().filter(|m| m.is_working).count(),
            broken = feed_metadata.values().filter(|m| !m.is_working).count(),
            "cached feed snapshot"
        );

        CachedFeedData {
            all_entries,
            working_feeds,
            feed_metadata,
            last_updated: Some(now),
        }
    }
}

struct FeedOutcome {
    category_index: usize,
    position: usize,
    feed_url: String,
    result: Result<Vec<FeedEntry>, FeedError>,
}

fn broken_metadata(feed_url: &str, icon: &str) -> FeedMetadata {
    FeedMetadata {
        display_name: favicon::domain_of(feed_url).unwrap_or_else(|| "Unknown Feed".to_string()),
        favicon_url: favicon::favicon_url(feed_url).unwrap_or_default(),
        fallback_icon: icon.to_string(),
        is_working: false,
        last_checked: Utc::now(),
        feed_url: feed_url.to_string(),
    }
}

/// Long-lived refresh loop: rebuilds on every interval tick and on every
/// external refresh signal. One bad iteration never ends the loop; a failed
/// rebuild leaves a short-lived empty snapshot behind, which doubles as the
/// retry backoff.
pub async fn start_refresh_worker(
    cache: Arc<FeedCache>,
    mut signals: mpsc::Receiver<()>,
    interval: Duration,
) {
    info!("warming feed cache");
    cache.get().await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                info!("scheduled feed refresh");
            }
            signal = signals.recv() => {
                match signal {
                    Some(()) => info!("refresh signal received"),
                    None => {
                        info!("refresh channel closed, stopping worker");
                        break;
                    }
                }
            }
        }
        cache.refresh().await;
    }
}
