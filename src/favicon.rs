use url::Url;

/// Known domains whose glyph should win over any title heuristic.
const DOMAIN_ICONS: &[(&str, &str)] = &[
    ("github.com", "🐙"),
    ("youtube.com", "📺"),
    ("stackoverflow.com", "📚"),
    ("reddit.com", "👽"),
    ("news.ycombinator.com", "🟠"),
    ("lobste.rs", "🦞"),
    ("medium.com", "✍️"),
    ("dev.to", "👨‍💻"),
];

/// Title-substring heuristics, scanned in order. First match wins.
const TITLE_ICONS: &[(&str, &str)] = &[
    // Technology vendors and platforms
    ("microsoft", "🏢"),
    ("azure", "☁️"),
    ("aws", "☁️"),
    ("google", "🔍"),
    ("mozilla", "🦊"),
    ("github", "🐙"),
    ("youtube", "📺"),
    ("rust", "🦀"),
    ("linux", "🐧"),
    ("kubernetes", "☸️"),
    // Content types
    ("blog", "📝"),
    ("news", "📰"),
    ("tutorial", "📚"),
    ("documentation", "📖"),
    ("guide", "🗺️"),
    ("tips", "💡"),
    ("community", "👥"),
    ("foundation", "🏛️"),
    ("podcast", "🎙️"),
    ("weekly", "🗞️"),
    ("security", "🔒"),
    ("dev", "👨‍💻"),
    ("tech", "💻"),
    ("code", "💻"),
];

pub const DEFAULT_ICON: &str = "🌐";
pub const ERROR_ICON: &str = "❌";

/// Best-guess favicon URL for a feed: the site root favicon.ico.
/// `None` when the feed URL itself will not parse.
pub fn favicon_url(feed_url: &str) -> Option<String> {
    let domain = domain_of(feed_url)?;
    Some(format!("https://{domain}/favicon.ico"))
}

/// Picks a fallback glyph for a feed.
///
/// The known-domain table is consulted first, then the feed title is scanned
/// for substring matches; unmatched feeds get the generic globe.
pub fn fallback_icon(feed_title: &str, feed_url: &str) -> &'static str {
    if let Some(domain) = domain_of(feed_url) {
        for (known, icon) in DOMAIN_ICONS {
            if domain == *known {
                return icon;
            }
        }
    }

    let lower = feed_title.to_lowercase();
    for (needle, icon) in TITLE_ICONS {
        if lower.contains(needle) {
            return icon;
        }
    }

    DEFAULT_ICON
}

/// Lowercased host of a URL with any `www.` prefix removed.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}
