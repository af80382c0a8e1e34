use reqwest::Url;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

use super::client::Transport;
use super::retry::{get_with_retry, RetryPolicy};
use crate::error::{IngestError, Result};
use crate::parser::RawRecord;

/// One parsed upstream page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<RawRecord>,
    /// Absolute URL of the following page, if any
    pub next: Option<String>,
}

/// Parse a page body. Two shapes are understood:
///
/// - REST: `{"next": "...", "results": [...]}`
/// - GraphQL: `{"data": {"allPlanets": {"planets": [...]}}}` (single page)
pub fn parse_page(url: &str, body: &str) -> Result<Page> {
    let malformed = |reason: String| IngestError::UpstreamMalformed {
        url: url.to_string(),
        reason,
    };

    let json: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {}", e)))?;

    if let Some(errors) = json.get("errors") {
        let empty = errors.is_null() || errors.as_array().is_some_and(|a| a.is_empty());
        if !empty {
            return Err(malformed(format!("upstream reported errors: {}", errors)));
        }
    }

    let (items, next) = if let Some(results) = json.get("results") {
        (results, json.get("next"))
    } else if let Some(planets) = json.pointer("/data/allPlanets/planets") {
        (planets, None)
    } else {
        return Err(malformed(
            "expected a `results` or `data.allPlanets.planets` list".to_string(),
        ));
    };

    let items = items
        .as_array()
        .ok_or_else(|| malformed("record list is not an array".to_string()))?;

    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        match item {
            Value::Object(map) => records.push(map.clone()),
            other => {
                return Err(malformed(format!(
                    "record {} is not an object: {}",
                    idx, other
                )))
            }
        }
    }

    let next = match next {
        None | Some(Value::Null) => None,
        Some(Value::String(link)) if link.trim().is_empty() => None,
        Some(Value::String(link)) => Some(
            Url::parse(url)
                .and_then(|base| base.join(link.trim()))
                .map_err(|e| malformed(format!("bad next link {:?}: {}", link, e)))?
                .to_string(),
        ),
        Some(other) => return Err(malformed(format!("next link is not a string: {}", other))),
    };

    Ok(Page { records, next })
}

/// URL of the first page: `base` with `page=1` and `limit=<page_size>`.
/// Any `page` or `limit` already on `base` is replaced; other query
/// parameters are kept.
pub fn first_page_url(base: &str, page_size: u32) -> Result<String> {
    let mut url = Url::parse(base).map_err(|e| IngestError::UpstreamUnavailable {
        url: base.to_string(),
        reason: format!("invalid base URL: {}", e),
    })?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page" && key != "limit")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", "1")
        .append_pair("limit", &page_size.to_string());
    Ok(url.to_string())
}

/// Paginated reader over the upstream planet listing
pub struct Fetcher<T: Transport> {
    transport: T,
    policy: RetryPolicy,
    base_url: String,
    page_size: u32,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(
        transport: T,
        base_url: impl Into<String>,
        page_size: u32,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            policy,
            base_url: base_url.into(),
            page_size: page_size.max(1),
        }
    }

    /// Lazily yields raw records, fetching pages on demand. After the first
    /// error the stream ends.
    pub fn records(&self) -> RecordStream<'_, T> {
        let (next_url, pending_error) = match first_page_url(&self.base_url, self.page_size) {
            Ok(url) => (Some(url), None),
            Err(e) => (None, Some(e)),
        };
        RecordStream {
            fetcher: self,
            next_url,
            pending_error,
            buffer: VecDeque::new(),
            visited: HashSet::new(),
            pages: 0,
        }
    }

    fn fetch_page(&self, url: &str) -> Result<Page> {
        let body = get_with_retry(&self.transport, &self.policy, url)?;
        parse_page(url, &body)
    }
}

pub struct RecordStream<'a, T: Transport> {
    fetcher: &'a Fetcher<T>,
    next_url: Option<String>,
    pending_error: Option<IngestError>,
    buffer: VecDeque<RawRecord>,
    visited: HashSet<String>,
    pages: usize,
}

impl<T: Transport> RecordStream<'_, T> {
    /// Pages fetched so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn load_next_page(&mut self, url: String) -> Result<()> {
        if !self.visited.insert(url.clone()) {
            return Err(IngestError::UpstreamMalformed {
                url,
                reason: "pagination loops back to a page already read".to_string(),
            });
        }

        debug!(url = %url, "fetching page");
        let page = self.fetcher.fetch_page(&url)?;
        self.pages += 1;
        info!(url = %url, records = page.records.len(), "fetched page");

        self.buffer.extend(page.records);
        self.next_url = page.next;
        Ok(())
    }
}

impl<T: Transport> Iterator for RecordStream<'_, T> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Some(Ok(record));
            }
            if let Some(err) = self.pending_error.take() {
                return Some(Err(err));
            }

            let url = self.next_url.take()?;
            if let Err(e) = self.load_next_page(url) {
                self.next_url = None;
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::client::{HttpReply, TransportError};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves fixed bodies per URL and records the URLs requested
    struct Pages {
        bodies: HashMap<String, HttpReply>,
        requested: RefCell<Vec<String>>,
    }

    impl Pages {
        fn new(entries: Vec<(&str, HttpReply)>) -> Self {
            Self {
                bodies: entries.into_iter().map(|(u, r)| (u.to_string(), r)).collect(),
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Pages {
        fn get(&self, url: &str) -> std::result::Result<HttpReply, TransportError> {
            self.requested.borrow_mut().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| TransportError(format!("no route to {}", url)))
        }
    }

    fn names(records: &[RawRecord]) -> Vec<&str> {
        records.iter().map(|r| r["name"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_first_page_url() {
        assert_eq!(
            first_page_url("https://swapi.dev/api/planets/", 10).unwrap(),
            "https://swapi.dev/api/planets/?page=1&limit=10"
        );
        assert_eq!(
            first_page_url("http://api.test/planets/?page=3&format=json&limit=50", 5).unwrap(),
            "http://api.test/planets/?format=json&page=1&limit=5"
        );
        assert!(first_page_url("not a url", 10).is_err());
    }

    #[test]
    fn test_parse_rest_page() {
        let body = json!({
            "count": 60,
            "next": "https://swapi.dev/api/planets/?page=2",
            "results": [{ "name": "Tatooine" }, { "name": "Alderaan" }]
        })
        .to_string();
        let page = parse_page("https://swapi.dev/api/planets/?page=1", &body).unwrap();
        assert_eq!(names(&page.records), vec!["Tatooine", "Alderaan"]);
        assert_eq!(page.next.as_deref(), Some("https://swapi.dev/api/planets/?page=2"));
    }

    #[test]
    fn test_parse_relative_next_link() {
        let body = json!({ "next": "/api/planets/?page=3", "results": [] }).to_string();
        let page = parse_page("https://swapi.dev/api/planets/?page=2", &body).unwrap();
        assert_eq!(page.next.as_deref(), Some("https://swapi.dev/api/planets/?page=3"));
    }

    #[test]
    fn test_parse_graphql_page() {
        let body = json!({
            "data": { "allPlanets": { "planets": [
                { "name": "Yavin IV", "climates": ["temperate", "tropical"] }
            ]}}
        })
        .to_string();
        let page = parse_page("https://example.test/graphql", &body).unwrap();
        assert_eq!(names(&page.records), vec!["Yavin IV"]);
        assert_eq!(page.next, None);
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        for body in [
            "<html>Bad gateway</html>".to_string(),
            json!({ "detail": "nope" }).to_string(),
            json!({ "results": { "name": "x" } }).to_string(),
            json!({ "results": ["Tatooine"] }).to_string(),
            json!({ "results": [], "next": 7 }).to_string(),
            json!({ "errors": [{ "message": "boom" }], "data": null }).to_string(),
        ] {
            let err = parse_page("http://x/", &body).unwrap_err();
            assert_eq!(err.kind(), "UpstreamMalformed", "body: {}", body);
        }
    }

    #[test]
    fn test_records_follow_pagination() {
        let transport = Pages::new(vec![
            (
                "http://api.test/planets/?page=1&limit=2",
                HttpReply::new(
                    200,
                    json!({ "next": "http://api.test/planets/?page=2&limit=2",
                            "results": [{ "name": "A" }, { "name": "B" }] })
                    .to_string(),
                ),
            ),
            (
                "http://api.test/planets/?page=2&limit=2",
                HttpReply::new(200, json!({ "next": null, "results": [{ "name": "C" }] }).to_string()),
            ),
        ]);
        let fetcher = Fetcher::new(
            &transport,
            "http://api.test/planets/",
            2,
            RetryPolicy::immediate(1),
        );

        let mut stream = fetcher.records();
        let records: Vec<RawRecord> = stream.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(names(&records), vec!["A", "B", "C"]);
        assert_eq!(stream.pages(), 2);
    }

    #[test]
    fn test_records_are_lazy() {
        let transport = Pages::new(vec![(
            "http://api.test/planets/?page=1&limit=1",
            HttpReply::new(
                200,
                json!({ "next": "http://api.test/planets/?page=2&limit=1",
                        "results": [{ "name": "A" }] })
                .to_string(),
            ),
        )]);
        let fetcher = Fetcher::new(
            &transport,
            "http://api.test/planets/",
            1,
            RetryPolicy::immediate(1),
        );

        let mut stream = fetcher.records();
        assert!(stream.next().unwrap().is_ok());
        assert_eq!(transport.requested.borrow().len(), 1);

        // Second page is missing: the error surfaces only now, then the stream ends
        assert_eq!(stream.next().unwrap().unwrap_err().kind(), "UpstreamUnavailable");
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_pagination_loop_is_malformed() {
        let transport = Pages::new(vec![(
            "http://api.test/planets/?page=1&limit=5",
            HttpReply::new(
                200,
                json!({ "next": "http://api.test/planets/?page=1&limit=5", "results": [] }).to_string(),
            ),
        )]);
        let fetcher = Fetcher::new(
            &transport,
            "http://api.test/planets/",
            5,
            RetryPolicy::immediate(1),
        );

        let results: Vec<_> = fetcher.records().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap_err().kind(), "UpstreamMalformed");
    }
}
