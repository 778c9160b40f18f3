//! Cache keys derived from requests.

use std::fmt;

use reqwest::Method;
use url::Url;

use crate::http_client::ApiRequest;

/// Normalized name of a cacheable request.
///
/// Query pairs are sorted by key so that `?b=2&a=1` and `?a=1&b=2` address the
/// same entry. Headers never participate. For `GET` the identity is just the
/// normalized URL; other methods are prefixed with the method name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestIdentity(String);

impl RequestIdentity {
    pub fn new(method: &Method, url: &str) -> Self {
        let url = normalize_url(url);
        if *method == Method::GET {
            Self(url)
        } else {
            Self(format!("{} {}", method, url))
        }
    }

    pub fn of(request: &ApiRequest) -> Self {
        Self::new(&request.method, &request.url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sort query pairs by key (stable for repeated keys) and drop the fragment.
/// Unparseable URLs are used verbatim.
fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    url.set_fragment(None);

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }

    url.to_string()
}
