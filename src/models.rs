use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A named group of feed URLs from the feed list.
///
/// Order of `feed_urls` matches the order in the backing resource. A URL may
/// appear in more than one category; duplicates are preserved.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedCategory {
    pub name: String,
    pub feed_urls: Vec<String>,
}

impl FeedCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            feed_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CategorizedFeeds {
    pub categories: Vec<FeedCategory>,
}

impl CategorizedFeeds {
    /// Flattens to a single URL list, category order then intra-category
    /// order, duplicates preserved.
    pub fn all_feed_urls(&self) -> Vec<String> {
        self.categories
            .iter()
            .flat_map(|c| c.feed_urls.iter().cloned())
            .collect()
    }

    /// Name of the first category containing the given URL.
    pub fn category_for(&self, feed_url: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| c.feed_urls.iter().any(|u| u == feed_url))
            .map(|c| c.name.as_str())
    }
}

/// One normalized syndication item. Built during parsing, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub description: String,
    pub link: String,
    /// Item publish time, falling back to its updated time. `None` when the
    /// item carried neither; `None` sorts after every dated entry.
    pub published: Option<DateTime<Utc>>,
    pub author: String,
    /// Feed-level title the entry came from.
    pub feed_source: String,
    /// Category tags carried on the item itself.
    pub categories: Vec<String>,
    /// Name of the feed-list category the feed was grouped under.
    pub source_category: String,
    pub feed_display_name: String,
    pub feed_url: String,
    pub favicon_url: Option<String>,
    pub fallback_icon: Option<String>,
}

impl FeedEntry {
    pub fn slug(&self) -> String {
        slug_from_url(&self.feed_url)
    }
}

/// Per-feed parse outcome, overwritten wholesale on each cache rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct FeedMetadata {
    pub display_name: String,
    pub favicon_url: String,
    pub fallback_icon: String,
    pub is_working: bool,
    pub last_checked: DateTime<Utc>,
    pub feed_url: String,
}

impl FeedMetadata {
    pub fn slug(&self) -> String {
        slug_from_url(&self.feed_url)
    }
}

/// The atomic cache payload. Replaced as a whole, never patched in place.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CachedFeedData {
    /// Every entry from every working feed, sorted by publish time descending.
    pub all_entries: Vec<FeedEntry>,
    /// Categories that still have at least one working feed.
    pub working_feeds: CategorizedFeeds,
    pub feed_metadata: HashMap<String, FeedMetadata>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Everything the rendering layer needs for one page of the home view.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HomeViewModel {
    /// Entries for the current page only.
    pub entries: Vec<FeedEntry>,
    pub categories: CategorizedFeeds,
    pub feed_metadata: HashMap<String, FeedMetadata>,
    pub current_category: Option<String>,
    pub current_feed_url: Option<String>,
    pub current_page: usize,
    pub total_pages: usize,
    pub error_message: Option<String>,
}

impl HomeViewModel {
    pub fn page_title(&self) -> String {
        if let Some(feed_url) = &self.current_feed_url {
            if let Some(meta) = self.feed_metadata.get(feed_url) {
                return format!("Posts from {}", meta.display_name);
            }
            if let Some(entry) = self.entries.iter().find(|e| &e.feed_url == feed_url) {
                if !entry.feed_display_name.trim().is_empty() {
                    return format!("Posts from {}", entry.feed_display_name);
                }
            }
            if let Ok(parsed) = url::Url::parse(feed_url) {
                if let Some(host) = parsed.host_str() {
                    return format!("Posts from {host}");
                }
            }
            return "Feed Posts".to_string();
        }

        if let Some(category) = &self.current_category {
            return format!("{category} Posts");
        }

        "Latest Posts".to_string()
    }

    pub fn page_subtitle(&self) -> String {
        if let Some(feed_url) = &self.current_feed_url {
            if let Some(meta) = self.feed_metadata.get(feed_url) {
                return format!("Latest posts from {}", meta.display_name);
            }
            return "Posts from this specific feed".to_string();
        }

        if let Some(category) = &self.current_category {
            return format!("All posts from {category} category");
        }

        "Stay up to date with your feeds".to_string()
    }
}

/// Derives a URL-safe slug from a feed URL.
///
/// Strips a leading http:// or https:// (case-insensitive), collapses every
/// run of non-alphanumeric characters to a single dash, trims dashes, and
/// lowercases. Empty input yields an empty slug.
pub fn slug_from_url(feed_url: &str) -> String {
    let rest = match feed_url.get(..8) {
        Some(prefix) if prefix.eq_ignore_ascii_case("https://") => &feed_url[8..],
        _ => match feed_url.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("http://") => &feed_url[7..],
            _ => feed_url,
        },
    };

    let mut slug = String::with_capacity(rest.len());
    let mut pending_dash = false;
    for c in rest.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Sorts entries by publish time, newest first. Entries with no date go last.
pub fn sort_entries_newest_first(entries: &mut [FeedEntry]) {
    entries.sort_by(|a, b| b.published.cmp(&a.published));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn entry_with(feed_url: &str, published: Option<DateTime<Utc>>) -> FeedEntry {
        FeedEntry {
            title: "Title".to_string(),
            description: String::new(),
            link: String::new(),
            published,
            author: String::new(),
            feed_source: "Feed".to_string(),
            categories: Vec::new(),
            source_category: "Uncategorized".to_string(),
            feed_display_name: "Feed".to_string(),
            feed_url: feed_url.to_string(),
            favicon_url: None,
            fallback_icon: None,
        }
    }

    mod slug_tests {
        use super::*;

        #[test]
        fn test_slug_strips_scheme_and_lowercases() {
            assert_eq!(slug_from_url("https://Example.com/Feed!!"), "example-com-feed");
        }

        #[test]
        fn test_slug_http_scheme() {
            assert_eq!(slug_from_url("http://blog.example.org/rss.xml"), "blog-example-org-rss-xml");
        }

        #[test]
        fn test_slug_collapses_symbol_runs() {
            assert_eq!(slug_from_url("https://a.com//feed??x=1"), "a-com-feed-x-1");
        }

        #[test]
        fn test_slug_empty_input() {
            assert_eq!(slug_from_url(""), "");
        }

        #[test]
        fn test_slug_no_scheme() {
            assert_eq!(slug_from_url("Example.com/feed"), "example-com-feed");
        }

        #[test]
        fn test_slug_mixed_case_scheme() {
            assert_eq!(slug_from_url("HTTPS://EXAMPLE.COM/FEED"), "example-com-feed");
        }

        #[test]
        fn test_entry_and_metadata_slugs_agree() {
            let entry = entry_with("https://example.com/feed", None);
            let meta = FeedMetadata {
                display_name: "Feed".to_string(),
                favicon_url: String::new(),
                fallback_icon: "🌐".to_string(),
                is_working: true,
                last_checked: Utc::now(),
                feed_url: "https://example.com/feed".to_string(),
            };
            assert_eq!(entry.slug(), meta.slug());
        }
    }

    mod categorized_feeds_tests {
        use super::*;

        fn sample() -> CategorizedFeeds {
            CategorizedFeeds {
                categories: vec![
                    FeedCategory {
                        name: "News".to_string(),
                        feed_urls: vec![
                            "https://a.com/rss".to_string(),
                            "https://b.com/rss".to_string(),
                        ],
                    },
                    FeedCategory {
                        name: "Blogs".to_string(),
                        feed_urls: vec![
                            "https://c.com/rss".to_string(),
                            // Duplicate of a News URL on purpose
                            "https://a.com/rss".to_string(),
                        ],
                    },
                ],
            }
        }

        #[test]
        fn test_all_feed_urls_preserves_order_and_duplicates() {
            let feeds = sample();
            let urls = feeds.all_feed_urls();
            assert_eq!(
                urls,
                vec![
                    "https://a.com/rss",
                    "https://b.com/rss",
                    "https://c.com/rss",
                    "https://a.com/rss",
                ]
            );
        }

        #[test]
        fn test_all_feed_urls_length_matches_category_sum() {
            let feeds = sample();
            let sum: usize = feeds.categories.iter().map(|c| c.feed_urls.len()).sum();
            assert_eq!(feeds.all_feed_urls().len(), sum);
        }

        #[test]
        fn test_category_for_returns_first_match() {
            let feeds = sample();
            assert_eq!(feeds.category_for("https://a.com/rss"), Some("News"));
            assert_eq!(feeds.category_for("https://c.com/rss"), Some("Blogs"));
            assert_eq!(feeds.category_for("https://missing.com/rss"), None);
        }
    }

    mod sort_tests {
        use super::*;

        #[test]
        fn test_sort_newest_first() {
            let jan = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let feb = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
            let mar = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

            let mut entries = vec![
                entry_with("https://a.com", Some(jan)),
                entry_with("https://b.com", Some(mar)),
                entry_with("https://c.com", Some(feb)),
            ];
            sort_entries_newest_first(&mut entries);

            let dates: Vec<_> = entries.iter().map(|e| e.published.unwrap()).collect();
            assert_eq!(dates, vec![mar, feb, jan]);
        }

        #[test]
        fn test_undated_entries_sort_last() {
            let jan = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let mut entries = vec![
                entry_with("https://a.com", None),
                entry_with("https://b.com", Some(jan)),
            ];
            sort_entries_newest_first(&mut entries);

            assert_eq!(entries[0].published, Some(jan));
            assert_eq!(entries[1].published, None);
        }
    }

    mod view_model_tests {
        use super::*;

        #[test]
        fn test_page_title_defaults() {
            let model = HomeViewModel::default();
            assert_eq!(model.page_title(), "Latest Posts");
            assert_eq!(model.page_subtitle(), "Stay up to date with your feeds");
        }

        #[test]
        fn test_page_title_for_category() {
            let model = HomeViewModel {
                current_category: Some("News".to_string()),
                ..Default::default()
            };
            assert_eq!(model.page_title(), "News Posts");
            assert_eq!(model.page_subtitle(), "All posts from News category");
        }

        #[test]
        fn test_page_title_prefers_metadata_display_name() {
            let mut feed_metadata = HashMap::new();
            feed_metadata.insert(
                "https://example.com/feed".to_string(),
                FeedMetadata {
                    display_name: "Example Blog".to_string(),
                    favicon_url: String::new(),
                    fallback_icon: "🌐".to_string(),
                    is_working: true,
                    last_checked: Utc::now(),
                    feed_url: "https://example.com/feed".to_string(),
                },
            );
            let model = HomeViewModel {
                feed_metadata,
                current_feed_url: Some("https://example.com/feed".to_string()),
                ..Default::default()
            };
            assert_eq!(model.page_title(), "Posts from Example Blog");
        }

        #[test]
        fn test_page_title_falls_back_to_host() {
            let model = HomeViewModel {
                current_feed_url: Some("https://example.com/feed".to_string()),
                ..Default::default()
            };
            assert_eq!(model.page_title(), "Posts from example.com");
        }
    }
}
