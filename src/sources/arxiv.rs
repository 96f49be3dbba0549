//! arXiv export API source: newest submissions in a set of categories.

use async_trait::async_trait;
use feed_rs::parser;

use crate::models::{PaperRecord, PaperRecordBuilder};
use crate::sources::{get_feed_body, FeedWindow, FetchError, PaperFeed};
use crate::utils::{collapse_whitespace, HttpClient, RetryConfig};

/// Base URL for arXiv API
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
/// Base URL for arXiv abstract pages
const ARXIV_ABS_URL: &str = "https://arxiv.org/abs";
/// arXiv refuses pages larger than this
const ARXIV_MAX_RESULTS: usize = 2000;

/// arXiv feed source
///
/// Queries the export API sorted by submission date, newest first, so the
/// head of the batch is always the latest papers.
#[derive(Debug, Clone)]
pub struct ArxivFeed {
    client: HttpClient,
    endpoint: String,
    categories: Vec<String>,
    terms: Vec<String>,
    window: FeedWindow,
    retry: RetryConfig,
}

impl ArxivFeed {
    /// Create a new arXiv feed with no filters
    pub fn new(client: HttpClient, window: FeedWindow, retry: RetryConfig) -> Self {
        Self {
            client,
            endpoint: ARXIV_API_URL.to_string(),
            categories: Vec::new(),
            terms: Vec::new(),
            window,
            retry,
        }
    }

    /// Restrict to these categories (OR-ed), e.g. "cs.CL"
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    /// Require these free-text terms (AND-ed)
    pub fn with_terms(mut self, terms: Vec<String>) -> Self {
        self.terms = terms;
        self
    }

    /// Override the API endpoint; `None` keeps the default
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        self
    }

    /// Normalise an arXiv ID from various formats
    ///
    /// Handles formats like:
    /// - "2301.12345"
    /// - "2301.12345v1" (version is stripped)
    /// - "arxiv:2301.12345"
    /// - "http://arxiv.org/abs/2301.12345v1"
    /// - "math.GT/0104020v2" (old style)
    pub fn parse_id(id: &str) -> Result<String, FetchError> {
        let id = id.trim();
        // ascii only, so byte offsets match `id`
        let lowered = id.to_ascii_lowercase();

        let id = match lowered.find("/abs/") {
            Some(pos) => &id[pos + 5..],
            None => match lowered.strip_prefix("arxiv:") {
                Some(_) => &id[6..],
                None => id,
            },
        };

        let id = strip_version(id.trim_end_matches('/'));
        if id.is_empty() {
            return Err(FetchError::Parse("Empty arXiv ID".to_string()));
        }

        Ok(id.to_string())
    }

    /// Build search query for arXiv API
    fn build_search_query(&self) -> String {
        let mut parts = Vec::new();

        let cats: Vec<String> = self
            .categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| format!("cat:{}", c))
            .collect();
        match cats.len() {
            0 => {}
            1 => parts.push(cats[0].clone()),
            _ => parts.push(format!("({})", cats.join(" OR "))),
        }

        for term in self.terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if term.contains(' ') {
                parts.push(format!("all:\"{}\"", term));
            } else {
                parts.push(format!("all:{}", term));
            }
        }

        if parts.is_empty() {
            "all:*".to_string()
        } else {
            parts.join(" AND ")
        }
    }

    fn request_url(&self) -> String {
        let max_results = self
            .window
            .max_items
            .unwrap_or(50)
            .clamp(1, ARXIV_MAX_RESULTS);

        format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
            self.endpoint,
            urlencoding::encode(&self.build_search_query()),
            max_results
        )
    }

    /// Parse an arXiv Atom response into records
    pub fn parse_document(body: &[u8]) -> Result<Vec<PaperRecord>, FetchError> {
        let feed = parser::parse(body)
            .map_err(|e| FetchError::Parse(format!("Failed to parse Atom feed: {}", e)))?;

        feed.entries.iter().map(Self::parse_entry).collect()
    }

    /// Parse arXiv Atom feed entry into PaperRecord
    fn parse_entry(entry: &feed_rs::model::Entry) -> Result<PaperRecord, FetchError> {
        if !entry.id.contains("/abs/") {
            // the API reports query errors as a single entry pointing at /api/errors
            let detail = entry
                .summary
                .as_ref()
                .map(|s| s.content.clone())
                .unwrap_or_else(|| entry.id.clone());
            return Err(FetchError::Parse(format!("arXiv API error entry: {}", detail)));
        }

        let paper_id = Self::parse_id(&entry.id)?;

        let title = entry
            .title
            .as_ref()
            .map(|t| collapse_whitespace(&t.content))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FetchError::Parse(format!("arXiv entry {} has no title", paper_id)))?;

        let published_at = entry
            .published
            .or(entry.updated)
            .ok_or_else(|| FetchError::Parse(format!("arXiv entry {} has no date", paper_id)))?;

        let summary = entry
            .summary
            .as_ref()
            .map(|s| collapse_whitespace(&s.content))
            .unwrap_or_default();

        Ok(PaperRecordBuilder::new(
            paper_id.clone(),
            title,
            format!("{}/{}", ARXIV_ABS_URL, paper_id),
            published_at,
        )
        .authors(entry.authors.iter().map(|a| collapse_whitespace(&a.name)))
        .summary(summary)
        .categories(entry.categories.iter().map(|c| c.term.clone()))
        .build())
    }
}

/// Drop a trailing version suffix such as "v2"
fn strip_version(id: &str) -> &str {
    if let Some(pos) = id.rfind('v') {
        let suffix = &id[pos + 1..];
        if pos > 0 && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return &id[..pos];
        }
    }
    id
}

#[async_trait]
impl PaperFeed for ArxivFeed {
    fn id(&self) -> &str {
        "arxiv"
    }

    fn name(&self) -> &str {
        "arXiv"
    }

    async fn fetch(&self) -> Result<Vec<PaperRecord>, FetchError> {
        let url = self.request_url();
        tracing::debug!("Querying arXiv: {}", url);

        let body = get_feed_body(&self.client, &url, "application/atom+xml", self.retry).await?;
        let records = Self::parse_document(&body)?;
        Ok(self.window.apply(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const ARXIV_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>arXiv Query Results</title>
  <id>http://arxiv.org/api/query</id>
  <updated>2024-12-23T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2412.01234v2</id>
    <updated>2024-12-22T18:00:00Z</updated>
    <published>2024-12-20T18:00:00Z</published>
    <title>Test Paper
      Title</title>
    <summary>  Test
      abstract </summary>
    <author><name>Test Author</name></author>
    <author><name>Second Author</name></author>
    <link href="http://arxiv.org/abs/2412.01234v2" rel="alternate" type="text/html"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    fn feed() -> ArxivFeed {
        ArxivFeed::new(HttpClient::new().unwrap(), FeedWindow::default(), RetryConfig::no_retry())
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(ArxivFeed::parse_id("2301.12345").unwrap(), "2301.12345");
        assert_eq!(ArxivFeed::parse_id("arxiv:2301.12345").unwrap(), "2301.12345");
        assert_eq!(ArxivFeed::parse_id("ARXIV:2301.12345").unwrap(), "2301.12345");
        assert_eq!(
            ArxivFeed::parse_id("https://arxiv.org/abs/2301.12345v1").unwrap(),
            "2301.12345"
        );
        assert_eq!(ArxivFeed::parse_id("2301.12345v12").unwrap(), "2301.12345");
    }

    #[test]
    fn test_parse_id_old_format() {
        assert_eq!(
            ArxivFeed::parse_id("http://arxiv.org/abs/math.GT/0104020v2").unwrap(),
            "math.GT/0104020"
        );
        // a 'v' inside the archive name is not a version
        assert_eq!(
            ArxivFeed::parse_id("solv-int/9901001").unwrap(),
            "solv-int/9901001"
        );
    }

    #[test]
    fn test_parse_id_errors() {
        assert!(ArxivFeed::parse_id("").is_err());
        assert!(ArxivFeed::parse_id("arxiv:").is_err());
    }

    #[test]
    fn test_parse_id_non_ascii_prefix() {
        // 'İ' grows by a byte under full Unicode lowercasing
        assert_eq!(
            ArxivFeed::parse_id("https://example.org/İ/abs/2301.12345v1").unwrap(),
            "2301.12345"
        );
        assert_eq!(ArxivFeed::parse_id("İxx/abs/2301.12345").unwrap(), "2301.12345");
    }

    #[test]
    fn test_build_search_query() {
        let feed = feed()
            .with_categories(vec!["cs.CL".into(), "cs.LG".into()])
            .with_terms(vec!["retrieval".into(), "large language".into()]);

        assert_eq!(
            feed.build_search_query(),
            "(cat:cs.CL OR cat:cs.LG) AND all:retrieval AND all:\"large language\""
        );
    }

    #[test]
    fn test_build_search_query_empty() {
        assert_eq!(feed().build_search_query(), "all:*");
    }

    #[test]
    fn test_request_url_sorts_newest_first() {
        let url = feed().with_categories(vec!["cs.AI".into()]).request_url();
        assert!(url.starts_with(ARXIV_API_URL));
        assert!(url.contains("search_query=cat%3Acs.AI"));
        assert!(url.contains("sortBy=submittedDate"));
        assert!(url.contains("sortOrder=descending"));
        assert!(url.contains("max_results=50"));
    }

    #[test]
    fn test_parse_document() {
        let records = ArxivFeed::parse_document(ARXIV_SAMPLE.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.id, "2412.01234");
        assert_eq!(r.title, "Test Paper Title");
        assert_eq!(r.summary, "Test abstract");
        assert_eq!(r.url, "https://arxiv.org/abs/2412.01234");
        assert_eq!(r.authors, vec!["Test Author", "Second Author"]);
        assert_eq!(r.categories, vec!["cs.CL"]);
        assert_eq!(r.published_at, Utc.with_ymd_and_hms(2024, 12, 20, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_api_error_entry_is_parse_error() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>arXiv Query Results</title>
  <id>http://arxiv.org/api/query</id>
  <updated>2024-12-23T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
    <title>Error</title>
    <summary>incorrect id format for 1234</summary>
    <updated>2024-12-23T00:00:00-05:00</updated>
    <link href="http://arxiv.org/api/errors#incorrect_id_format_for_1234" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

        let result = ArxivFeed::parse_document(body.as_bytes());
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_fetch_from_mock_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/query")
            .match_query(mockito::Matcher::UrlEncoded(
                "sortBy".into(),
                "submittedDate".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/atom+xml")
            .with_body(ARXIV_SAMPLE)
            .create_async()
            .await;

        let feed = feed()
            .with_categories(vec!["cs.CL".into()])
            .with_endpoint(Some(format!("{}/api/query", server.url())));

        let records = feed.fetch().await.unwrap();
        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "2412.01234");
    }
}
