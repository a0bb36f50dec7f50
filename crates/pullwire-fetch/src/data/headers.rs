//! Header presets used by the configuration presets.

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:106.0) Gecko/20100101 Firefox/106.0";

pub type HeaderList = Vec<(String, String)>;

fn list(pairs: &[(&str, &str)]) -> HeaderList {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A generic desktop browser user agent.
pub fn default_headers() -> HeaderList {
    list(&[("User-Agent", DEFAULT_USER_AGENT)])
}

/// Headers for automated SEC access.
///
/// The SEC asks automated clients to identify themselves with a contact
/// in the user agent, e.g. `"Example Corp admin@example.com"`.
pub fn sec_bot_headers(contact: &str) -> HeaderList {
    list(&[("User-Agent", contact), ("Accept-Encoding", "gzip, deflate")])
}

pub fn rss_feed_headers() -> HeaderList {
    list(&[
        (
            "User-Agent",
            "Mozilla/5.0 (compatible; Feedfetcher-Google; +http://www.google.com/feedfetcher.html)",
        ),
        ("Accept", "application/rss+xml, application/xml, text/xml"),
    ])
}

pub fn desktop_chrome_headers() -> HeaderList {
    list(&[(
        "User-Agent",
        "Mozilla/5.0 (Macintosh; ARM Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.5938.149 Safari/537.36",
    )])
}
