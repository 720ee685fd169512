use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use feed_rs::model::Entry;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tracing::warn;

use crate::favicon;
use crate::models::{sort_entries_newest_first, CategorizedFeeds, FeedEntry};
use crate::source::FeedSource;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "feedmux/1.0 (Feed Aggregator)";
/// Max feeds fetched at the same time during a fan-out.
pub(crate) const MAX_CONCURRENT_FETCHES: usize = 10;

/// Errors for a single feed. Failures never escalate past the feed they
/// belong to; the aggregation layer maps them to a broken classification.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Network(reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("request timed out")]
    Timeout,
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Network(e)
        }
    }
}

pub struct FeedParser {
    client: Client,
}

impl FeedParser {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Fetches and parses one feed into normalized entries.
    ///
    /// Any failure (network, timeout, non-2xx, malformed XML) is returned as
    /// a [`FeedError`] so the caller can classify the feed.
    pub async fn try_parse_feed(
        &self,
        feed_url: &str,
        source_category: Option<&str>,
    ) -> Result<Vec<FeedEntry>, FeedError> {
        let response = self.client.get(feed_url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::HttpStatus(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;

        // Index the raw XML before handing the bytes to feed-rs; extension
        // elements feed-rs drops are still reachable through it.
        let body = String::from_utf8_lossy(&bytes);
        let raw_items = RawItemIndex::parse(&body);

        let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| FeedError::Parse(e.to_string()))?;

        let feed_title = feed
            .title
            .map(|t| t.content)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| host_of(feed_url));
        let favicon_url = favicon::favicon_url(feed_url);
        let fallback_icon = favicon::fallback_icon(&feed_title, feed_url);

        let entries = feed
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let raw_item = raw_items.for_entry(index, &entry);
                build_entry(
                    entry,
                    raw_item,
                    feed_url,
                    &feed_title,
                    source_category,
                    favicon_url.as_deref(),
                    fallback_icon,
                )
            })
            .collect();

        Ok(entries)
    }

    /// Infallible variant of [`Self::try_parse_feed`]: logs the failure and
    /// returns an empty sequence instead of propagating it.
    pub async fn parse_feed(&self, feed_url: &str, source_category: Option<&str>) -> Vec<FeedEntry> {
        match self.try_parse_feed(feed_url, source_category).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(feed = feed_url, error = %e, "failed to parse feed");
                Vec::new()
            }
        }
    }

    /// Fetches every feed of every category concurrently, flattens the
    /// results, and sorts newest first.
    pub async fn parse_all_feeds(&self, source: &dyn FeedSource) -> Vec<FeedEntry> {
        let categorized = source.get_categorized_feeds();
        self.parse_categorized(&categorized).await
    }

    pub async fn parse_categorized(&self, categorized: &CategorizedFeeds) -> Vec<FeedEntry> {
        let pairs: Vec<(String, String)> = categorized
            .categories
            .iter()
            .flat_map(|c| c.feed_urls.iter().map(|u| (c.name.clone(), u.clone())))
            .collect();

        let mut entries: Vec<FeedEntry> = stream::iter(pairs)
            .map(|(category, url)| async move { self.parse_feed(&url, Some(&category)).await })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect::<Vec<Vec<FeedEntry>>>()
            .await
            .into_iter()
            .flatten()
            .collect();

        sort_entries_newest_first(&mut entries);
        entries
    }

    /// Same fan-out, bucketed by source category. Buckets keep the global
    /// newest-first ordering.
    pub async fn parse_all_feeds_by_category(
        &self,
        source: &dyn FeedSource,
    ) -> HashMap<String, Vec<FeedEntry>> {
        let all = self.parse_all_feeds(source).await;

        let mut grouped: HashMap<String, Vec<FeedEntry>> = HashMap::new();
        for entry in all {
            grouped
                .entry(entry.source_category.clone())
                .or_default()
                .push(entry);
        }
        grouped
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

fn build_entry(
    entry: Entry,
    raw_item: Option<&RawItem>,
    feed_url: &str,
    feed_title: &str,
    source_category: Option<&str>,
    favicon_url: Option<&str>,
    fallback_icon: &str,
) -> FeedEntry {
    let description = extract_description(&entry, raw_item);
    let link = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();
    let published = entry.published.or(entry.updated);
    let author = author_of(&entry);
    let categories: Vec<String> = entry.categories.iter().map(|c| c.term.clone()).collect();
    let title = entry
        .title
        .map(|t| t.content)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "No Title".to_string());

    FeedEntry {
        title,
        description,
        link,
        published,
        author,
        feed_source: feed_title.to_string(),
        categories,
        source_category: source_category.unwrap_or("Uncategorized").to_string(),
        feed_display_name: feed_title.to_string(),
        feed_url: feed_url.to_string(),
        favicon_url: favicon_url.map(|u| u.to_string()),
        fallback_icon: Some(fallback_icon.to_string()),
    }
}

/// Author name, falling back to email, else empty.
fn author_of(entry: &Entry) -> String {
    entry
        .authors
        .first()
        .map(|person| {
            if person.name.trim().is_empty() {
                person.email.clone().unwrap_or_default()
            } else {
                person.name.clone()
            }
        })
        .unwrap_or_default()
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "Unknown Source".to_string())
}

// ---------------------------------------------------------------------------
// Description extraction
// ---------------------------------------------------------------------------

type Strategy = fn(&Entry, Option<&RawItem>) -> Option<String>;

/// Ordered fallback chain for item descriptions. The first candidate that is
/// non-empty after cleaning and passes the unhelpful-content screen wins.
const STRATEGIES: &[Strategy] = &[
    content_body,
    media_description,
    media_text,
    media_content_attribute,
    content_src_link,
    summary_text,
    alternative_extensions,
    any_substantial_extension,
];

pub fn extract_description(entry: &Entry, raw_item: Option<&RawItem>) -> String {
    for strategy in STRATEGIES {
        if let Some(candidate) = strategy(entry, raw_item) {
            let cleaned = clean_description(&candidate);
            if !cleaned.is_empty() && !is_unhelpful_content(&cleaned) {
                return cleaned;
            }
        }
    }
    String::new()
}

/// Full content body: content:encoded on RSS, `<content>` on Atom.
fn content_body(entry: &Entry, _raw: Option<&RawItem>) -> Option<String> {
    entry.content.as_ref()?.body.clone()
}

/// media:description, either directly on the item or nested in a
/// media:group the way video-platform feeds structure it.
fn media_description(entry: &Entry, _raw: Option<&RawItem>) -> Option<String> {
    entry
        .media
        .iter()
        .find_map(|m| m.description.as_ref().map(|t| t.content.clone()))
}

/// media:text blocks attached to any media object.
fn media_text(entry: &Entry, _raw: Option<&RawItem>) -> Option<String> {
    entry
        .media
        .iter()
        .flat_map(|m| m.texts.iter())
        .map(|t| t.text.content.clone())
        .next()
}

/// A description="" attribute on a media:* element; feed-rs does not surface
/// attributes, so this reads the raw item XML.
fn media_content_attribute(_entry: &Entry, raw: Option<&RawItem>) -> Option<String> {
    raw?.media_content_description()
}

/// Link-only Atom content (`<content src="…"/>`). Yields the bare URL, which
/// the unhelpful screen then rejects; kept so the chain mirrors the content
/// variants instead of silently skipping one.
fn content_src_link(entry: &Entry, _raw: Option<&RawItem>) -> Option<String> {
    entry
        .content
        .as_ref()?
        .src
        .as_ref()
        .map(|link| link.href.clone())
}

/// Standard summary/description field.
fn summary_text(entry: &Entry, _raw: Option<&RawItem>) -> Option<String> {
    entry.summary.as_ref().map(|t| t.content.clone())
}

const ALTERNATIVE_ELEMENTS: &[&str] = &["description", "desc", "excerpt", "snippet", "fulltext", "body"];

/// Custom extension elements that some publishers use for descriptions.
fn alternative_extensions(_entry: &Entry, raw: Option<&RawItem>) -> Option<String> {
    let raw = raw?;
    ALTERNATIVE_ELEMENTS
        .iter()
        .find_map(|name| raw.element_text(name).filter(|t| !t.trim().is_empty()))
}

/// Last resort: the first non-core item child with substantial text.
fn any_substantial_extension(_entry: &Entry, raw: Option<&RawItem>) -> Option<String> {
    raw?.first_substantial_text()
}

/// Collapses whitespace, decodes HTML entities, strips CDATA wrappers.
pub fn clean_description(content: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let ws = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    let content = strip_cdata(content);
    let collapsed = ws.replace_all(content.trim(), " ");
    decode_entities(collapsed.trim())
}

fn strip_cdata(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}

/// Decodes the common named entities plus numeric character references.
/// Unknown entities are left as-is.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        // Entities are short; only look a little way ahead for the ';'
        let Some(end) = rest.bytes().take(12).position(|b| b == b';') else {
            out.push('&');
            rest = &rest[1..];
            continue;
        };

        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity.strip_prefix('#').and_then(|num| {
                let code = if let Some(hex) = num.strip_prefix(['x', 'X']) {
                    u32::from_str_radix(hex, 16).ok()
                } else {
                    num.parse::<u32>().ok()
                }?;
                char::from_u32(code)
            }),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn unhelpful_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Channel IDs like "UCvtT19MZW8dq5Wwfu6B0oxw"
            r"^UC[A-Za-z0-9_-]{22}$",
            // Video-ID shapes
            r"^[A-Za-z0-9_-]{11}$",
            r"(?i)^(no\s*description|none|n/a|null|undefined)$",
            r"^(\.{3,}|_{3,}|-{3,})$",
            r"(?i)^(test|example|placeholder|todo|tbd)$",
            // Call-to-action words with no context
            r"(?i)^(subscribe|like|share|comment)$",
            // Bare URLs
            r"(?i)^www\.[a-z0-9-]+\.[a-z]{2,}$",
            r"(?i)^https?://\S+$",
            // All caps with digits, ID-shaped
            r"^[A-Z]{2,}[0-9]+$",
            r"(?i)^(coming\s*soon|more\s*info|details\s*to\s*follow)$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static regex"))
        .collect()
    })
}

/// Screens out candidate descriptions that carry no information: opaque
/// platform IDs, placeholder words, bare URLs, and symbol soup.
pub fn is_unhelpful_content(content: &str) -> bool {
    let content = content.trim();
    if content.is_empty() {
        return true;
    }

    if unhelpful_patterns().iter().any(|re| re.is_match(content)) {
        return true;
    }

    let len = content.chars().count();

    // Generic opaque tokens, not human-readable
    if (20..=30).contains(&len)
        && content
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return true;
    }

    // Too short to be a meaningful description
    if len < 10 && !content.contains(' ') {
        return true;
    }

    // Mostly numbers or symbols
    let letters = content.chars().filter(|c| c.is_alphabetic()).count();
    if len > 5 && (letters as f64) / (len as f64) < 0.3 {
        return true;
    }

    false
}

// ---------------------------------------------------------------------------
// Raw item index
// ---------------------------------------------------------------------------

/// Per-item slices of the raw document, for extension elements that feed-rs
/// does not carry into its model.
pub struct RawItemIndex {
    items: Vec<RawItem>,
}

pub struct RawItem {
    raw: String,
    guid: Option<String>,
    link: Option<String>,
}

impl RawItemIndex {
    pub fn parse(xml: &str) -> Self {
        let mut blocks = Vec::new();
        collect_blocks(xml, "item", &mut blocks);
        if blocks.is_empty() {
            collect_blocks(xml, "entry", &mut blocks);
        }

        let items = blocks
            .into_iter()
            .map(|raw| {
                let item = RawItem {
                    guid: None,
                    link: None,
                    raw,
                };
                let guid = item
                    .element_text("guid")
                    .or_else(|| item.element_text("id"))
                    .map(|t| t.trim().to_string());
                let link = item.element_text("link").map(|t| t.trim().to_string());
                RawItem { guid, link, ..item }
            })
            .collect();

        Self { items }
    }

    /// Matches a parsed entry back to its raw block, by guid or link, with a
    /// positional fallback (feed-rs preserves document order).
    pub fn for_entry(&self, index: usize, entry: &Entry) -> Option<&RawItem> {
        let link = entry.links.first().map(|l| l.href.as_str());
        self.items
            .iter()
            .find(|item| {
                (!entry.id.is_empty() && item.guid.as_deref() == Some(entry.id.as_str()))
                    || (link.is_some() && item.link.as_deref() == link)
            })
            .or_else(|| self.items.get(index))
    }
}

fn collect_blocks(xml: &str, tag: &str, out: &mut Vec<String>) {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut search = 0usize;

    while let Some(rel) = xml[search..].find(&open) {
        let start = search + rel;
        let after_open = start + open.len();
        // Reject prefixes of longer tag names (<items>, <entryref>, ...)
        let delimited = matches!(
            xml[after_open..].chars().next(),
            Some(c) if c == '>' || c.is_whitespace()
        );
        if !delimited {
            search = after_open;
            continue;
        }

        let Some(body_rel) = xml[after_open..].find('>') else {
            break;
        };
        let body_start = after_open + body_rel + 1;
        let Some(end_rel) = xml[body_start..].find(&close) else {
            break;
        };
        out.push(xml[body_start..body_start + end_rel].to_string());
        search = body_start + end_rel + close.len();
    }
}

impl RawItem {
    /// Text content of the first element with the given local name, any
    /// namespace prefix accepted. CDATA wrappers are stripped.
    pub fn element_text(&self, name: &str) -> Option<String> {
        let re = Regex::new(&format!(
            r"(?is)<(?:[a-z0-9._-]+:)?{name}(?:\s[^>]*)?>(.*?)</(?:[a-z0-9._-]+:)?{name}\s*>"
        ))
        .ok()?;
        let caps = re.captures(&self.raw)?;
        Some(strip_cdata(caps.get(1)?.as_str()).to_string())
    }

    /// A description attribute on any media:* element.
    pub fn media_content_description(&self) -> Option<String> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r#"(?is)<media:[a-z]+\b[^>]*?\bdescription\s*=\s*"([^"]+)""#)
                .expect("static regex")
        });
        re.captures(&self.raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// First child element outside the syndication core with more than 20
    /// characters of text.
    pub fn first_substantial_text(&self) -> Option<String> {
        const CORE_TAGS: &[&str] = &[
            "title", "link", "guid", "pubdate", "author", "creator", "category", "comments",
            "enclosure", "source", "description", "content", "encoded", "summary", "id",
            "updated", "published",
        ];

        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"(?is)<([a-z][a-z0-9._:-]*)(?:\s[^>]*)?>([^<]{21,}?)</").expect("static regex")
        });

        for caps in re.captures_iter(&self.raw) {
            let tag = caps[1].to_lowercase();
            let local = tag.rsplit(':').next().unwrap_or(tag.as_str());
            if CORE_TAGS.contains(&local) {
                continue;
            }
            let text = caps[2].trim();
            if text.chars().count() > 20 {
                return Some(text.to_string());
            }
        }
        None
    }
}
