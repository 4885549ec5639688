//! DuckDuckGo provider: keyless web search fallback.
//!
//! Uses the HTML-only endpoint at `https://html.duckduckgo.com/html/`, which
//! needs no JavaScript and no API key, and scrapes organic results with CSS
//! selectors.

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::error::RetrievalError;
use crate::provider::{Provider, ProviderRequest, ProviderSpec};
use crate::types::Document;

use super::http;
use super::positional_relevance;

/// DuckDuckGo HTML scraper.
pub struct DuckDuckGoProvider {
    spec: ProviderSpec,
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoProvider {
    /// Build a DuckDuckGo provider for `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the HTTP client cannot be built.
    pub fn new(
        spec: ProviderSpec,
        base_url: &str,
        user_agent: Option<&str>,
    ) -> Result<Self, RetrievalError> {
        Ok(Self {
            spec,
            client: http::build_client(user_agent)?,
            base_url: base_url.to_owned(),
        })
    }

    /// Extract the actual URL from DuckDuckGo's redirect wrapper.
    ///
    /// DDG wraps URLs like: `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`
    fn extract_url(href: &str) -> Option<String> {
        let full_href = if href.starts_with("//") {
            format!("https:{href}")
        } else {
            href.to_string()
        };

        let parsed = Url::parse(&full_href).ok()?;

        if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, value)| value.into_owned())
        } else {
            Some(full_href)
        }
    }
}

#[async_trait]
impl Provider for DuckDuckGoProvider {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    async fn fetch(&self, request: &ProviderRequest) -> Result<Vec<Document>, RetrievalError> {
        tracing::trace!(query = %request.text, "DuckDuckGo search");

        let response = self
            .client
            .post(&self.base_url)
            .form(&[("q", request.text.as_str())])
            .header("Accept-Language", "en-US,en;q=0.9")
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| http::classify("duckduckgo", e))?
            .error_for_status()
            .map_err(|e| RetrievalError::Http(format!("DuckDuckGo HTTP error: {e}")))?;

        let html = response
            .text()
            .await
            .map_err(|e| http::classify("duckduckgo", e))?;

        tracing::trace!(bytes = html.len(), "DuckDuckGo response received");

        parse_duckduckgo_html(&self.spec, &html, request.max_results)
    }
}

/// Parse a DuckDuckGo HTML results page into documents.
pub(crate) fn parse_duckduckgo_html(
    spec: &ProviderSpec,
    html: &str,
    max_results: usize,
) -> Result<Vec<Document>, RetrievalError> {
    let document = Html::parse_document(html);

    let result_sel = Selector::parse(
        ".result.results_links.results_links_deep:not(.result--ad), .web-result:not(.result--ad)",
    )
    .map_err(|e| RetrievalError::Parse(format!("invalid result selector: {e:?}")))?;
    let title_sel = Selector::parse(".result__a")
        .map_err(|e| RetrievalError::Parse(format!("invalid title selector: {e:?}")))?;
    let snippet_sel = Selector::parse(".result__snippet")
        .map_err(|e| RetrievalError::Parse(format!("invalid snippet selector: {e:?}")))?;

    let mut documents = Vec::new();

    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };

        let title = collapse_whitespace(&title_el.text().collect::<String>());
        if title.is_empty() {
            continue;
        }

        let Some(url) = title_el
            .value()
            .attr("href")
            .and_then(DuckDuckGoProvider::extract_url)
        else {
            continue;
        };

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();

        let position = documents.len();
        documents.push(Document {
            id: None,
            content: if snippet.is_empty() {
                title.clone()
            } else {
                snippet
            },
            title,
            url: Some(url),
            relevance: positional_relevance(position),
            source_provider: spec.id.clone(),
            source_kind: spec.kind,
            lane: spec.lane.clone(),
        });

        if documents.len() >= max_results {
            break;
        }
    }

    tracing::debug!(count = documents.len(), "DuckDuckGo results parsed");
    Ok(documents)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointDescriptor;
    use crate::types::{Mode, ProviderKind};
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MOCK_DDG_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2F&amp;rut=abc123">
        Rust Programming Language
    </a>
    <div class="result__snippet">
        A language empowering everyone to build reliable and efficient software.
    </div>
</div>
<div class="result results_links results_links_deep web-result result--ad">
    <a class="result__a" href="https://ads.example.com/">Sponsored (Ad)</a>
    <div class="result__snippet">Buy now.</div>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://doc.rust-lang.org/book/">
        The Rust Programming Language Book
    </a>
    <div class="result__snippet">
        An introductory book about Rust.
    </div>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fen.wikipedia.org%2Fwiki%2FRust_(programming_language)&amp;rut=def456">
        Rust (programming language) - Wikipedia
    </a>
</div>
</body>
</html>"#;

    fn spec() -> ProviderSpec {
        ProviderSpec {
            id: "duckduckgo".into(),
            lane: "web_search".into(),
            kind: ProviderKind::Keyless,
            timeout_ms: 800,
            endpoint: EndpointDescriptor::DuckDuckGoHtml {
                base_url: "https://html.duckduckgo.com/html/".into(),
            },
        }
    }

    #[test]
    fn extract_url_from_ddg_redirect() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage&rut=abc";
        let result = DuckDuckGoProvider::extract_url(href);
        assert_eq!(result, Some("https://example.com/page".to_string()));
    }

    #[test]
    fn extract_url_direct_link() {
        let href = "https://example.com/direct";
        let result = DuckDuckGoProvider::extract_url(href);
        assert_eq!(result, Some("https://example.com/direct".to_string()));
    }

    #[test]
    fn extract_url_invalid() {
        assert!(DuckDuckGoProvider::extract_url("not-a-url").is_none());
    }

    #[test]
    fn parse_mock_html_returns_organic_results() {
        let docs = parse_duckduckgo_html(&spec(), MOCK_DDG_HTML, 10).expect("should parse");
        assert_eq!(docs.len(), 3);

        assert_eq!(docs[0].title, "Rust Programming Language");
        assert_eq!(docs[0].url.as_deref(), Some("https://www.rust-lang.org/"));
        assert!(docs[0].content.contains("reliable and efficient"));
        assert_eq!(docs[0].source_provider, "duckduckgo");
        assert_eq!(docs[0].source_kind, ProviderKind::Keyless);

        assert_eq!(docs[1].url.as_deref(), Some("https://doc.rust-lang.org/book/"));
        assert!(docs.iter().all(|d| !d.title.contains("(Ad)")));
    }

    #[test]
    fn result_without_snippet_uses_title_as_content() {
        let docs = parse_duckduckgo_html(&spec(), MOCK_DDG_HTML, 10).expect("should parse");
        assert_eq!(docs[2].content, docs[2].title);
    }

    #[test]
    fn parse_respects_max_results() {
        let docs = parse_duckduckgo_html(&spec(), MOCK_DDG_HTML, 2).expect("should parse");
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn relevance_decays_with_position() {
        let docs = parse_duckduckgo_html(&spec(), MOCK_DDG_HTML, 10).expect("should parse");
        assert!(docs[0].relevance > docs[1].relevance);
        assert!(docs[1].relevance > docs[2].relevance);
    }

    #[test]
    fn parse_empty_html_returns_empty() {
        let docs = parse_duckduckgo_html(&spec(), "<html><body></body></html>", 10)
            .expect("should parse");
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn fetch_posts_form_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOCK_DDG_HTML))
            .mount(&server)
            .await;

        let provider =
            DuckDuckGoProvider::new(spec(), &server.uri(), Some("FanoutTest/1.0")).expect("build");
        let request = ProviderRequest {
            text: "rust".into(),
            mode: Mode::Simple,
            max_results: 10,
            timeout: Duration::from_secs(2),
        };
        let docs = provider.fetch(&request).await.expect("fetch");
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DuckDuckGoProvider>();
    }
}
