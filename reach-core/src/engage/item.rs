use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::PlatformSection;

use super::error::{EngageError, EngageResult};

/// Canonical permalink of one content item: origin and path only, path always
/// terminated by `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Url);

impl ItemId {
    /// Canonicalizes an absolute URL or an href relative to `base`.
    pub fn canonicalize(raw: &str, base: &Url) -> Option<ItemId> {
        let url = base.join(raw.trim()).ok()?;
        Self::from_url(url)
    }

    /// Canonicalizes an absolute URL.
    pub fn parse(raw: &str) -> Option<ItemId> {
        let url = Url::parse(raw.trim()).ok()?;
        Self::from_url(url)
    }

    fn from_url(mut url: Url) -> Option<ItemId> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }
        url.set_query(None);
        url.set_fragment(None);
        url.set_username("").ok()?;
        url.set_password(None).ok()?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Some(ItemId(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// The path segment following the first matching permalink marker,
    /// e.g. `ABC123` for `/p/ABC123/` with marker `/p/`.
    pub fn item_key(&self, markers: &[String]) -> Option<&str> {
        let path = self.path();
        markers.iter().find_map(|marker| {
            let start = path.find(marker.as_str())? + marker.len();
            let key = path[start..].split('/').next()?;
            (!key.is_empty()).then_some(key)
        })
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Accepts canonical ids that point at a single item on the platform and
/// rejects administrative sublists such as like or comment listings.
#[derive(Debug, Clone)]
pub struct PermalinkFilter {
    host: String,
    markers: Vec<String>,
    excluded: Vec<String>,
}

impl PermalinkFilter {
    pub fn from_platform(platform: &PlatformSection) -> Self {
        Self {
            host: platform
                .base_url
                .host_str()
                .unwrap_or_default()
                .to_lowercase(),
            markers: platform.permalink_markers.clone(),
            excluded: platform.excluded_markers.clone(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    pub fn accepts(&self, item: &ItemId) -> bool {
        if !same_site(item.host(), &self.host) {
            return false;
        }
        let path = item.path();
        if self.excluded.iter().any(|marker| path.contains(marker.as_str())) {
            return false;
        }
        item.item_key(&self.markers).is_some()
    }
}

pub(crate) fn same_site(candidate: &str, expected: &str) -> bool {
    let strip = |host: &str| host.strip_prefix("www.").unwrap_or(host).to_string();
    strip(candidate) == strip(expected)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SearchCriterion {
    Tag(String),
    Text(String),
}

impl SearchCriterion {
    pub fn tag(raw: &str) -> EngageResult<Self> {
        let tag = raw.trim().trim_start_matches('#').trim().to_lowercase();
        if tag.is_empty() {
            return Err(EngageError::InvalidCriterion("tag must not be empty".into()));
        }
        if tag.chars().any(char::is_whitespace) {
            return Err(EngageError::InvalidCriterion(format!(
                "tag {raw:?} must be a single word"
            )));
        }
        Ok(SearchCriterion::Tag(tag))
    }

    pub fn text(raw: &str) -> EngageResult<Self> {
        let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return Err(EngageError::InvalidCriterion(
                "search text must not be empty".into(),
            ));
        }
        Ok(SearchCriterion::Text(text))
    }

    pub fn listing_url(&self, platform: &PlatformSection) -> EngageResult<Url> {
        let path = match self {
            SearchCriterion::Tag(tag) => platform.tag_listing.replace("{tag}", &encode(tag)),
            SearchCriterion::Text(text) => {
                platform.search_listing.replace("{query}", &encode(text))
            }
        };
        platform
            .base_url
            .join(&path)
            .map_err(|err| EngageError::InvalidCriterion(format!("bad listing url {path}: {err}")))
    }
}

impl fmt::Display for SearchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchCriterion::Tag(tag) => write!(f, "#{tag}"),
            SearchCriterion::Text(text) => write!(f, "\"{text}\""),
        }
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> PlatformSection {
        PlatformSection {
            name: "instagram".into(),
            base_url: Url::parse("https://www.instagram.com/").unwrap(),
            login_path: "/accounts/login/".into(),
            tag_listing: "/explore/tags/{tag}/".into(),
            search_listing: "/explore/search/keyword/?q={query}".into(),
            permalink_markers: vec!["/p/".into(), "/reel/".into()],
            excluded_markers: vec!["/liked_by/".into(), "/comments/".into()],
            favorite_endpoints: vec![],
            token_cookie: "csrftoken".into(),
            token_meta: "csrf-token".into(),
            token_header: "X-CSRFToken".into(),
        }
    }

    #[test]
    fn canonicalization_ignores_query_and_fragment() {
        let with_query = ItemId::parse("https://x/p/abc?hl=en").unwrap();
        let plain = ItemId::parse("https://x/p/abc").unwrap();
        let with_fragment = ItemId::parse("https://x/p/abc/#comments").unwrap();
        assert_eq!(with_query, plain);
        assert_eq!(plain, with_fragment);
        assert_eq!(plain.as_str(), "https://x/p/abc/");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        for raw in [
            "https://WWW.Instagram.com/p/CxYz/?utm_source=ig",
            "https://www.instagram.com:443/reel/Q1/#x",
            "http://user:pw@example.com/p/a",
        ] {
            let once = ItemId::parse(raw).unwrap();
            let twice = ItemId::parse(once.as_str()).unwrap();
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn relative_hrefs_resolve_against_base() {
        let base = Url::parse("https://www.instagram.com/").unwrap();
        let item = ItemId::canonicalize("/p/ABC123/?img_index=2", &base).unwrap();
        assert_eq!(item.as_str(), "https://www.instagram.com/p/ABC123/");
        assert!(ItemId::canonicalize("javascript:void(0)", &base).is_none());
        assert!(ItemId::canonicalize("mailto:someone@example.com", &base).is_none());
    }

    #[test]
    fn filter_keeps_permalinks_and_drops_sublists() {
        let filter = PermalinkFilter::from_platform(&platform());
        let base = Url::parse("https://www.instagram.com/").unwrap();
        let accept = |href: &str| filter.accepts(&ItemId::canonicalize(href, &base).unwrap());
        assert!(accept("/p/ABC123/"));
        assert!(accept("https://instagram.com/reel/XYZ/"));
        assert!(accept("/someone/p/ABC123/"));
        assert!(!accept("/p/ABC123/liked_by/"));
        assert!(!accept("/p/ABC123/comments/"));
        assert!(!accept("/explore/tags/rust/"));
        assert!(!accept("/p/"));
        assert!(!accept("https://example.com/p/ABC123/"));
    }

    #[test]
    fn item_key_follows_marker() {
        let item = ItemId::parse("https://www.instagram.com/p/ABC123/").unwrap();
        let markers = platform().permalink_markers;
        assert_eq!(item.item_key(&markers), Some("ABC123"));
    }

    #[test]
    fn criteria_resolve_to_listing_urls() {
        let platform = platform();
        let tag = SearchCriterion::tag("#RustLang ").unwrap();
        assert_eq!(tag, SearchCriterion::Tag("rustlang".into()));
        assert_eq!(
            tag.listing_url(&platform).unwrap().as_str(),
            "https://www.instagram.com/explore/tags/rustlang/"
        );
        let text = SearchCriterion::text("  coffee   art ").unwrap();
        assert_eq!(
            text.listing_url(&platform).unwrap().as_str(),
            "https://www.instagram.com/explore/search/keyword/?q=coffee+art"
        );
        assert!(SearchCriterion::tag("#").is_err());
        assert!(SearchCriterion::tag("two words").is_err());
        assert!(SearchCriterion::text("   ").is_err());
    }
}
