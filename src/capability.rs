//! Capability kinds plugins can contribute.

use std::fmt;
use std::sync::Arc;

use crate::overlay::OverrideSet;

/// A content source (site scraper, catalog, ...).
pub trait ContentProvider: Send + Sync {
    /// Unique provider name, used as lookup key.
    fn name(&self) -> &str;

    /// Base url of the provider.
    fn main_url(&self) -> &str;

    /// Language code of the content.
    fn lang(&self) -> &str {
        "en"
    }

    /// Content types served, e.g. "movie", "anime".
    fn supported_types(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Extracts playable links from a hosting page.
pub trait LinkExtractor: Send + Sync {
    /// Unique extractor name, used as lookup key.
    fn name(&self) -> &str;

    /// Url prefix this extractor handles, in lower case.
    fn main_url(&self) -> &str;

    fn requires_referer(&self) -> bool {
        false
    }

    /// Whether this extractor handles `url`.
    ///
    /// The url is lowercased, and an `https:` or `//` prefix and a leading
    /// `www.` are ignored on both sides.
    fn matches(&self, url: &str) -> bool {
        strip_schema(&url.to_lowercase()).starts_with(strip_schema(self.main_url()))
    }
}

/// Strip a leading `https://`, `//` and then `www.` from `url`.
///
/// Other schemes are left in place, so `http://host` only matches a
/// `main_url` written with `http://`.
pub fn strip_schema(url: &str) -> &str {
    let rest = url.strip_prefix("https:").unwrap_or(url);
    match rest.strip_prefix("//") {
        Some(host) => host.strip_prefix("www.").unwrap_or(host),
        None => url,
    }
}

/// Handler for a user action on a playable item (open in player, copy, ...).
pub trait ActionHandler: Send + Sync {
    /// Stable id, used as lookup key.
    fn unique_id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Can be chosen as the default player.
    fn is_player(&self) -> bool {
        false
    }

    /// Operates on a single selected source.
    fn one_source(&self) -> bool {
        false
    }
}

/// Capability kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    ContentProvider,
    LinkExtractor,
    ActionHandler,
    OverrideSet,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityKind::ContentProvider => "content provider",
            CapabilityKind::LinkExtractor => "link extractor",
            CapabilityKind::ActionHandler => "action handler",
            CapabilityKind::OverrideSet => "override set",
        };
        f.write_str(name)
    }
}

/// A capability value handed over by a plugin.
#[derive(Clone)]
pub enum Capability {
    ContentProvider(Arc<dyn ContentProvider>),
    LinkExtractor(Arc<dyn LinkExtractor>),
    ActionHandler(Arc<dyn ActionHandler>),
    OverrideSet(Arc<OverrideSet>),
}

impl Capability {
    /// Kind of this capability.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::ContentProvider(_) => CapabilityKind::ContentProvider,
            Capability::LinkExtractor(_) => CapabilityKind::LinkExtractor,
            Capability::ActionHandler(_) => CapabilityKind::ActionHandler,
            Capability::OverrideSet(_) => CapabilityKind::OverrideSet,
        }
    }

    /// Natural lookup key for the capability.
    ///
    /// Override sets have no intrinsic key and return their display name.
    pub fn default_key(&self) -> String {
        match self {
            Capability::ContentProvider(p) => p.name().to_string(),
            Capability::LinkExtractor(e) => e.name().to_string(),
            Capability::ActionHandler(a) => a.unique_id().to_string(),
            Capability::OverrideSet(s) => s.name().to_string(),
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("kind", &self.kind())
            .field("key", &self.default_key())
            .finish()
    }
}
