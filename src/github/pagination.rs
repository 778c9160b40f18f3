//! `Link` header parsing for paginated list endpoints.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One pagination relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMeta {
    pub url: String,
    pub page: u32,
    pub per_page: u32,
}

/// Pagination relations extracted from a single response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<LinkMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<LinkMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<LinkMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<LinkMeta>,
}

impl PaginationMeta {
    /// True when no relation was found.
    pub fn is_empty(&self) -> bool {
        self.first.is_none() && self.prev.is_none() && self.next.is_none() && self.last.is_none()
    }

    fn slot(&mut self, rel: &str) -> Option<&mut Option<LinkMeta>> {
        match rel {
            "first" => Some(&mut self.first),
            "prev" => Some(&mut self.prev),
            "next" => Some(&mut self.next),
            "last" => Some(&mut self.last),
            _ => None,
        }
    }
}

/// A value paired with the pagination metadata of the response it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub meta: PaginationMeta,
    pub response: T,
}

impl<T> Paginated<T> {
    pub fn new(meta: PaginationMeta, response: T) -> Self {
        Self { meta, response }
    }

    /// Transform the payload, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Paginated<U> {
        Paginated {
            meta: self.meta,
            response: f(self.response),
        }
    }
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<\s*([^>\s]+)\s*>\s*;\s*rel\s*=\s*"([^"]*)""#).expect("valid link regex")
    })
}

/// Parse a `Link` header value into pagination relations.
///
/// Entries whose URL lacks integer `page` and `per_page` query parameters
/// are skipped, as are unknown `rel` values.
pub fn parse_link_header(link: Option<&str>) -> PaginationMeta {
    let mut meta = PaginationMeta::default();
    let Some(link) = link else {
        return meta;
    };

    for captures in link_pattern().captures_iter(link) {
        let target = &captures[1];
        let rel = captures[2].trim();

        let Some(slot) = meta.slot(rel) else {
            debug!("Ignoring unknown link relation {:?}", rel);
            continue;
        };
        let Some((base, query)) = target.split_once('?') else {
            continue;
        };

        let mut page = None;
        let mut per_page = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "page" => page = value.trim().parse::<u32>().ok(),
                "per_page" => per_page = value.trim().parse::<u32>().ok(),
                _ => {}
            }
        }

        if let (Some(page), Some(per_page)) = (page, per_page) {
            *slot = Some(LinkMeta {
                url: base.to_string(),
                page,
                per_page,
            });
        }
    }

    debug!("Parsed pagination: {:?}", meta);
    meta
}
