use std::sync::Arc;

use base64::Engine;
use tracing::warn;

use crate::cache::FeedCache;
use crate::models::{
    sort_entries_newest_first, CachedFeedData, FeedEntry, HomeViewModel,
};

pub const UNAVAILABLE_MESSAGE: &str =
    "Unable to load feeds at this time. Please try again later.";

/// Read-side service over the cached snapshot: filtering, slug resolution,
/// and pagination for the home view.
pub struct HomePageService {
    cache: Arc<FeedCache>,
    entries_per_page: usize,
}

impl HomePageService {
    pub fn new(cache: Arc<FeedCache>, entries_per_page: usize) -> Self {
        Self {
            cache,
            entries_per_page,
        }
    }

    /// Entries filtered by feed URL (encoded input accepted) or category.
    pub async fn filtered_entries(
        &self,
        category: Option<&str>,
        feed_url: Option<&str>,
    ) -> Vec<FeedEntry> {
        let data = self.cache.get().await;
        let feed_url = feed_url.filter(|s| !s.trim().is_empty()).map(decode_feed_url);
        let category = category.filter(|s| !s.trim().is_empty()).map(decode_component);
        filter_entries(&data, category.as_deref(), feed_url.as_deref())
    }

    /// Original feed URL for a derived slug, `None` when nothing matches.
    pub async fn feed_url_from_slug(&self, slug: &str) -> Option<String> {
        let data = self.cache.get().await;
        feed_url_from_slug(&data, slug)
    }

    pub async fn home_view_model(
        &self,
        category: Option<&str>,
        feed_url: Option<&str>,
        page: usize,
    ) -> HomeViewModel {
        let data = self.cache.get().await;

        let current_feed_url = feed_url.filter(|s| !s.trim().is_empty()).map(decode_feed_url);
        let current_category = category.filter(|s| !s.trim().is_empty()).map(decode_component);

        let filtered = filter_entries(
            &data,
            current_category.as_deref(),
            current_feed_url.as_deref(),
        );

        let total_pages = total_pages(filtered.len(), self.entries_per_page);
        let page = clamp_page(page, total_pages);
        let entries = filtered
            .into_iter()
            .skip(page * self.entries_per_page)
            .take(self.entries_per_page)
            .collect();

        HomeViewModel {
            entries,
            categories: data.working_feeds.clone(),
            feed_metadata: data.feed_metadata.clone(),
            current_category,
            current_feed_url,
            current_page: page,
            total_pages,
            error_message: None,
        }
    }

    /// Like [`Self::home_view_model`] but addressed by feed slug. An
    /// unresolvable slug is not an error; it just leaves the feed filter off.
    pub async fn home_view_model_by_slug(
        &self,
        category: Option<&str>,
        slug: Option<&str>,
        page: usize,
    ) -> HomeViewModel {
        let mut feed_url = None;
        if let Some(slug) = slug.filter(|s| !s.trim().is_empty()) {
            feed_url = self.feed_url_from_slug(slug).await;
            if feed_url.is_none() {
                warn!(slug, "could not resolve feed slug");
            }
        }
        self.home_view_model(category, feed_url.as_deref(), page).await
    }
}

/// The degraded model handed to the rendering layer when nothing else can
/// be: empty data plus the generic failure message.
pub fn unavailable_view_model() -> HomeViewModel {
    HomeViewModel {
        error_message: Some(UNAVAILABLE_MESSAGE.to_string()),
        ..Default::default()
    }
}

/// Applies the mutually-exclusive filters: a feed URL wins over a category;
/// neither means everything. Result is sorted newest first.
pub fn filter_entries(
    data: &CachedFeedData,
    category: Option<&str>,
    feed_url: Option<&str>,
) -> Vec<FeedEntry> {
    let mut entries: Vec<FeedEntry> = if let Some(feed_url) = feed_url {
        data.all_entries
            .iter()
            .filter(|e| e.feed_url == feed_url)
            .cloned()
            .collect()
    } else if let Some(category) = category {
        data.all_entries
            .iter()
            .filter(|e| e.source_category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    } else {
        data.all_entries.clone()
    };

    sort_entries_newest_first(&mut entries);
    entries
}

pub fn feed_url_from_slug(data: &CachedFeedData, slug: &str) -> Option<String> {
    if slug.trim().is_empty() {
        return None;
    }
    data.feed_metadata
        .iter()
        .find(|(_, meta)| meta.slug() == slug)
        .map(|(url, _)| url.clone())
}

/// Decodes a feed-URL filter value: base64 first, percent-decoding as the
/// legacy fallback.
pub fn decode_feed_url(raw: &str) -> String {
    if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(raw) {
        if let Ok(text) = String::from_utf8(bytes) {
            return text;
        }
    }
    decode_component(raw)
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

pub fn total_pages(entry_count: usize, page_size: usize) -> usize {
    if entry_count == 0 || page_size == 0 {
        0
    } else {
        entry_count.div_ceil(page_size)
    }
}

/// Clamps a requested page index into `[0, total_pages - 1]`.
pub fn clamp_page(page: usize, total_pages: usize) -> usize {
    page.min(total_pages.saturating_sub(1))
}
