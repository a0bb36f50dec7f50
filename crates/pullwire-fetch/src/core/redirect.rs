use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static META_REFRESH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)content="0;\s*URL=(.+?)""#).expect("meta refresh pattern is valid")
});

static LOCATION_REPLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"location\.replace\("(.+?)"\)"#).expect("location.replace pattern is valid")
});

/// Find a client-side redirect in a page body.
///
/// Recognizes an immediate meta refresh (`content="0;URL=<target>"`) and a
/// script `location.replace("<target>")`, in that order of preference.
///
/// # Examples
///
/// ```
/// use pullwire_fetch::core::extract_client_redirect;
///
/// let page = r#"<meta http-equiv="refresh" content="0;URL=http://b/y">"#;
/// assert_eq!(extract_client_redirect(page).as_deref(), Some("http://b/y"));
/// assert_eq!(extract_client_redirect("<html></html>"), None);
/// ```
pub fn extract_client_redirect(body: &str) -> Option<String> {
    [&*META_REFRESH, &*LOCATION_REPLACE]
        .iter()
        .find_map(|re| re.captures(body))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|target| !target.is_empty())
}

/// Bookkeeping for one redirect-aware fetch.
///
/// At most one client-side redirect is ever followed: [`follow`] succeeds
/// once and then reports `None`, which bounds the chase at depth one even
/// when two pages redirect to each other.
///
/// [`follow`]: RedirectState::follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectState {
    requested: String,
    final_url: String,
    consumed: bool,
}

impl RedirectState {
    pub fn new(requested: impl Into<String>) -> Self {
        let requested = requested.into();
        Self {
            final_url: requested.clone(),
            requested,
            consumed: false,
        }
    }

    pub fn requested(&self) -> &str {
        &self.requested
    }

    pub fn final_url(&self) -> &str {
        &self.final_url
    }

    /// Whether the current page may still be scanned for a redirect.
    pub fn can_scan(&self) -> bool {
        !self.consumed
    }

    /// Record the URL the transport ended up at after HTTP redirects.
    pub fn record_final(&mut self, url: impl Into<String>) {
        self.final_url = url.into();
    }

    /// Take the single client-side hop. Relative targets resolve against the
    /// current final URL. Returns the URL to fetch next, or `None` once the
    /// hop has been used.
    pub fn follow(&mut self, target: &str) -> Option<String> {
        if self.consumed {
            return None;
        }
        self.consumed = true;
        let next = Url::parse(&self.final_url)
            .and_then(|base| base.join(target))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| target.to_string());
        self.final_url = next.clone();
        Some(next)
    }
}
