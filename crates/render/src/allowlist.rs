use std::collections::BTreeSet;

/// Presentational tags honoured when they appear as raw markup in a reply.
pub const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    "b", "strong", "i", "em", "u", "s", "del", "ins", "mark", "sub", "sup", "small", "kbd",
    "code", "br", "span",
];

/// Tags that can load or run content. They are refused even if a caller configures them.
const NEVER_ALLOWED_TAGS: &[&str] = &[
    "script", "style", "iframe", "frame", "frameset", "object", "embed", "applet", "svg", "math",
    "link", "meta", "base", "form", "input", "button", "textarea", "select", "img", "video",
    "audio", "source", "template", "noscript",
];

/// Tags without content or closing tag.
const VOID_TAGS: &[&str] = &["br"];

/// Explicit set of raw markup tags that may pass through into the display tree.
///
/// Everything not in the set is kept as literal text. Attributes are never carried over,
/// so an allowed tag cannot smuggle event handlers or styles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMarkupAllowList {
    tags: BTreeSet<String>,
}

impl Default for RawMarkupAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_TAGS.iter().copied())
    }
}

impl RawMarkupAllowList {
    pub fn new<I, T>(tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let tags = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_ascii_lowercase())
            .filter(|tag| !tag.is_empty() && !NEVER_ALLOWED_TAGS.contains(&tag.as_str()))
            .collect();
        Self { tags }
    }

    /// An allow-list that escapes every raw tag.
    pub fn empty() -> Self {
        Self {
            tags: BTreeSet::new(),
        }
    }

    pub fn allows(&self, tag: &str) -> bool {
        self.tags.contains(&tag.to_ascii_lowercase())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub(crate) fn is_void(tag: &str) -> bool {
        VOID_TAGS.contains(&tag)
    }
}

/// Returns true when a link destination may be followed.
///
/// Relative references and `http`, `https`, `mailto` are accepted. The scheme check runs
/// on the destination with whitespace and control characters removed, matching how
/// browsers normalise URLs before dispatching on the scheme.
pub fn is_safe_href(href: &str) -> bool {
    let compact: String = href
        .chars()
        .filter(|ch| !ch.is_whitespace() && !ch.is_control())
        .collect();
    if compact.is_empty() {
        return false;
    }

    let authority_end = compact.find(['/', '?', '#']).unwrap_or(compact.len());
    let head = &compact[..authority_end];

    // Entity-encoded colons would be decoded by an HTML consumer.
    if head.contains('&') {
        return false;
    }

    let Some((scheme, _)) = head.split_once(':') else {
        return true;
    };

    let scheme_is_well_formed = scheme
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'));
    if !scheme_is_well_formed {
        return false;
    }

    matches!(
        scheme.to_ascii_lowercase().as_str(),
        "http" | "https" | "mailto"
    )
}
