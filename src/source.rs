use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use url::Url;

use crate::models::{CategorizedFeeds, FeedCategory};

/// Supplies the categorized feed list. Implementations are swapped at
/// composition time; the backing resource is re-read on every call, so the
/// only caching in the pipeline lives in the aggregation engine.
pub trait FeedSource: Send + Sync {
    fn get_categorized_feeds(&self) -> CategorizedFeeds;

    fn get_feed_urls(&self) -> Vec<String> {
        self.get_categorized_feeds().all_feed_urls()
    }
}

/// Parses the feed-list text format.
///
/// A line starting with `#` opens a new category named by the rest of the
/// line. An absolute http/https URL is appended to the current category,
/// auto-creating "Uncategorized" when no header has been seen yet. Anything
/// else non-blank is logged and skipped.
pub fn parse_feed_list(content: &str) -> CategorizedFeeds {
    let mut feeds = CategorizedFeeds::default();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('#') {
            feeds.categories.push(FeedCategory::new(rest.trim()));
            continue;
        }

        if !is_http_url(trimmed) {
            warn!(line = trimmed, "invalid URL in feed list, skipping");
            continue;
        }

        if feeds.categories.is_empty() {
            feeds.categories.push(FeedCategory::new("Uncategorized"));
        }
        if let Some(current) = feeds.categories.last_mut() {
            current.feed_urls.push(trimmed.to_string());
        }
    }

    feeds
}

fn is_http_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => url.scheme() == "http" || url.scheme() == "https",
        Err(_) => false,
    }
}

/// Reads the feed list from a text file on every call.
pub struct FileFeedSource {
    path: PathBuf,
    seed_path: Option<PathBuf>,
}

impl FileFeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed_path: None,
        }
    }

    /// Seeds the feed list from a bundled copy when the file is missing.
    /// Seeding is best-effort; a failed copy only logs.
    pub fn with_seed(path: impl Into<PathBuf>, seed_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed_path: Some(seed_path.into()),
        }
    }

    fn seed_if_missing(&self) {
        if self.path.exists() {
            return;
        }
        let Some(seed) = &self.seed_path else {
            return;
        };
        match std::fs::copy(seed, &self.path) {
            Ok(_) => info!(
                seed = %seed.display(),
                path = %self.path.display(),
                "seeded feed list from bundled copy"
            ),
            Err(e) => warn!(
                seed = %seed.display(),
                error = %e,
                "failed to seed feed list from bundled copy"
            ),
        }
    }
}

impl FeedSource for FileFeedSource {
    fn get_categorized_feeds(&self) -> CategorizedFeeds {
        self.seed_if_missing();

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to read feed list");
                return CategorizedFeeds::default();
            }
        };

        let feeds = parse_feed_list(&content);
        info!(
            urls = feeds.all_feed_urls().len(),
            categories = feeds.categories.len(),
            path = %self.path.display(),
            "loaded feed list"
        );
        feeds
    }
}

/// Fixed in-memory feed list, mainly for tests and local development.
pub struct StaticFeedSource {
    feeds: CategorizedFeeds,
}

impl StaticFeedSource {
    pub fn new(feeds: CategorizedFeeds) -> Self {
        Self { feeds }
    }

    /// Builds a single-category source from a plain list of URLs.
    pub fn from_urls<S: AsRef<str>>(category: &str, urls: &[S]) -> Self {
        Self {
            feeds: CategorizedFeeds {
                categories: vec![FeedCategory {
                    name: category.to_string(),
                    feed_urls: urls.iter().map(|u| u.as_ref().to_string()).collect(),
                }],
            },
        }
    }
}

impl FeedSource for StaticFeedSource {
    fn get_categorized_feeds(&self) -> CategorizedFeeds {
        self.feeds.clone()
    }
}

/// Builds the configured file source, wiring in the optional seed copy.
pub fn file_source_from_config(feed_file: &str, seed_file: Option<&str>) -> FileFeedSource {
    match seed_file {
        Some(seed) => FileFeedSource::with_seed(Path::new(feed_file), Path::new(seed)),
        None => FileFeedSource::new(Path::new(feed_file)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    mod parse_feed_list_tests {
        use super::*;

        #[test]
        fn test_category_headers_group_urls() {
            let content = "\
# News
https://a.com/rss
https://b.com/rss

# Blogs
https://c.com/feed.xml
";
            let feeds = parse_feed_list(content);

            assert_eq!(feeds.categories.len(), 2);
            assert_eq!(feeds.categories[0].name, "News");
            assert_eq!(
                feeds.categories[0].feed_urls,
                vec!["https://a.com/rss", "https://b.com/rss"]
            );
            assert_eq!(feeds.categories[1].name, "Blogs");
            assert_eq!(feeds.categories[1].feed_urls, vec!["https://c.com/feed.xml"]);
        }

        #[test]
        fn test_url_before_header_lands_in_uncategorized() {
            let content = "https://example.com/feed\n# Later\nhttps://later.com/rss\n";
            let feeds = parse_feed_list(content);

            assert_eq!(feeds.categories.len(), 2);
            assert_eq!(feeds.categories[0].name, "Uncategorized");
            assert_eq!(feeds.categories[0].feed_urls, vec!["https://example.com/feed"]);
            assert_eq!(feeds.categories[1].name, "Later");
        }

        #[test]
        fn test_invalid_lines_are_skipped_not_fatal() {
            let content = "\
# News
https://a.com/rss
not a url
ftp://files.example.com/feed
https://b.com/rss
";
            let feeds = parse_feed_list(content);

            assert_eq!(feeds.categories.len(), 1);
            assert_eq!(
                feeds.categories[0].feed_urls,
                vec!["https://a.com/rss", "https://b.com/rss"]
            );
        }

        #[test]
        fn test_no_silent_drops_counting() {
            let content = "\
# A
https://one.example/rss
https://two.example/rss
# B
https://two.example/rss
";
            let feeds = parse_feed_list(content);
            let sum: usize = feeds.categories.iter().map(|c| c.feed_urls.len()).sum();
            assert_eq!(feeds.all_feed_urls().len(), sum);
            assert_eq!(sum, 3); // Duplicate across categories preserved
        }

        #[test]
        fn test_category_name_is_trimmed() {
            let feeds = parse_feed_list("#   Spaced Out  \nhttps://a.com/rss\n");
            assert_eq!(feeds.categories[0].name, "Spaced Out");
        }

        #[test]
        fn test_empty_header_category_allowed() {
            let feeds = parse_feed_list("#\nhttps://a.com/rss\n");
            assert_eq!(feeds.categories[0].name, "");
            assert_eq!(feeds.categories[0].feed_urls.len(), 1);
        }

        #[test]
        fn test_empty_input() {
            let feeds = parse_feed_list("");
            assert!(feeds.categories.is_empty());
        }
    }

    mod file_source_tests {
        use super::*;

        #[test]
        fn test_reads_feed_list_from_file() {
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(b"# News\nhttps://a.com/rss\n").unwrap();

            let source = FileFeedSource::new(file.path());
            let feeds = source.get_categorized_feeds();

            assert_eq!(feeds.categories.len(), 1);
            assert_eq!(feeds.categories[0].feed_urls, vec!["https://a.com/rss"]);
        }

        #[test]
        fn test_missing_file_yields_empty_result() {
            let source = FileFeedSource::new("/nonexistent/feeds.txt");
            let feeds = source.get_categorized_feeds();
            assert!(feeds.categories.is_empty());
            assert!(source.get_feed_urls().is_empty());
        }

        #[test]
        fn test_file_is_reread_on_every_call() {
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(b"https://a.com/rss\n").unwrap();
            file.flush().unwrap();

            let source = FileFeedSource::new(file.path());
            assert_eq!(source.get_feed_urls().len(), 1);

            file.write_all(b"https://b.com/rss\n").unwrap();
            file.flush().unwrap();
            assert_eq!(source.get_feed_urls().len(), 2);
        }

        #[test]
        fn test_seeds_from_bundled_copy_when_missing() {
            let dir = tempfile::tempdir().unwrap();
            let seed = dir.path().join("seed.txt");
            std::fs::write(&seed, "# Seeded\nhttps://seeded.com/rss\n").unwrap();

            let target = dir.path().join("feeds.txt");
            let source = FileFeedSource::with_seed(&target, &seed);

            let feeds = source.get_categorized_feeds();
            assert_eq!(feeds.categories[0].name, "Seeded");
            assert!(target.exists());
        }

        #[test]
        fn test_missing_seed_is_non_fatal() {
            let dir = tempfile::tempdir().unwrap();
            let target = dir.path().join("feeds.txt");
            let source = FileFeedSource::with_seed(&target, dir.path().join("no-seed.txt"));

            let feeds = source.get_categorized_feeds();
            assert!(feeds.categories.is_empty());
        }
    }

    mod static_source_tests {
        use super::*;

        #[test]
        fn test_static_source_returns_fixed_list() {
            let source =
                StaticFeedSource::from_urls("Dev", &["https://a.com/rss", "https://b.com/rss"]);
            let feeds = source.get_categorized_feeds();
            assert_eq!(feeds.categories.len(), 1);
            assert_eq!(feeds.categories[0].name, "Dev");
            assert_eq!(source.get_feed_urls().len(), 2);
        }
    }
}
