//! Discovered items and their identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Base URL used for announcements and fetches
pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Opaque short identifier of an upstream item (a YouTube video id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract the video id from a watch or short URL.
    ///
    /// Strips the `http(s)://(www.)youtube.com/watch?v=` or `youtu.be/`
    /// prefix and anything after the first `&` or `?`.
    pub fn from_url(url: &str) -> Self {
        let mut rest = url.trim();

        for scheme in ["https://", "http://"] {
            if let Some(stripped) = rest.strip_prefix(scheme) {
                rest = stripped;
                break;
            }
        }
        rest = rest.strip_prefix("www.").unwrap_or(rest);

        for host in ["youtube.com/", "youtu.be/"] {
            if let Some(stripped) = rest.strip_prefix(host) {
                rest = stripped;
                break;
            }
        }
        rest = rest.strip_prefix("watch?v=").unwrap_or(rest);

        let end = rest.find(['&', '?']).unwrap_or(rest.len());
        Self(rest[..end].to_string())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL for this id
    pub fn watch_url(&self) -> String {
        format!("{}{}", WATCH_URL_PREFIX, self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested vertical resolution (240, 360, 480, 720, 1080, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    /// Resolution used for regular subscription uploads
    pub const STANDARD: Self = Self(480);

    /// Resolution used for explicit HD re-downloads
    pub const HD: Self = Self(720);

    /// Format selector understood by youtube-dl compatible fetchers
    pub fn format_selector(&self) -> String {
        format!("best[height<={}]", self.0)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.0)
    }
}

/// A newly discovered piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Upstream identifier
    pub id: ItemId,

    /// Source URL handed to the fetcher
    pub url: String,

    /// Requested quality
    pub quality: Quality,
}

impl Item {
    /// Create an item for a video id using the canonical watch URL
    pub fn from_id(id: ItemId, quality: Quality) -> Self {
        let url = id.watch_url();
        Self { id, url, quality }
    }

    /// Create an item from an arbitrary URL
    pub fn from_url(url: &str, quality: Quality) -> Self {
        let url = url.split('&').next().unwrap_or(url).trim().to_string();
        Self {
            id: ItemId::from_url(&url),
            url,
            quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_watch_url() {
        assert_eq!(
            ItemId::from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_str(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            ItemId::from_url("http://youtube.com/watch?v=dQw4w9WgXcQ&t=42s").as_str(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_id_from_short_url() {
        assert_eq!(
            ItemId::from_url("https://youtu.be/dQw4w9WgXcQ?si=abc").as_str(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_item_from_url_drops_extra_params() {
        let item = Item::from_url("https://www.youtube.com/watch?v=abcdefghijk&list=PL1", Quality::HD);
        assert_eq!(item.url, "https://www.youtube.com/watch?v=abcdefghijk");
        assert_eq!(item.id.as_str(), "abcdefghijk");
        assert_eq!(item.quality, Quality(720));
    }

    #[test]
    fn test_format_selector() {
        assert_eq!(Quality(480).format_selector(), "best[height<=480]");
        assert_eq!(Quality::default(), Quality::STANDARD);
    }
}
