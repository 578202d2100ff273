//! HTTP implementation of [`Fetcher`] for listing-site detail pages.
//!
//! Fetches the posting URL, picks the first configured description element,
//! and converts its HTML to Markdown.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use jobsignal_shared::{JobSignalError, PostingRef, Result};

use crate::fetcher::{FetchError, Fetcher};

/// User-Agent string for detail requests.
const USER_AGENT: &str = concat!("jobsignal/", env!("CARGO_PKG_VERSION"));

/// Descriptions shorter than this are treated as missing.
const MIN_DETAIL_CHARS: usize = 50;

/// Detail fetcher over `reqwest`.
pub struct HttpFetcher {
    client: Client,
    selectors: Vec<String>,
    /// Allow localhost/private IPs (for integration tests with mock servers).
    allow_private_hosts: bool,
}

impl HttpFetcher {
    /// Build a fetcher trying `selectors` in order. Invalid selectors are a config error.
    pub fn new(selectors: &[String]) -> Result<Self> {
        if selectors.is_empty() {
            return Err(JobSignalError::config("at least one detail selector is required"));
        }
        for raw in selectors {
            Selector::parse(raw).map_err(|e| {
                JobSignalError::config(format!("invalid detail selector '{raw}': {e}"))
            })?;
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| JobSignalError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            selectors: selectors.to_vec(),
            allow_private_hosts: false,
        })
    }

    /// Allow fetching from localhost/private IPs (for integration tests).
    pub fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        reference: &PostingRef,
        timeout: Duration,
    ) -> std::result::Result<String, FetchError> {
        let url = Url::parse(reference.as_str())
            .map_err(|e| FetchError::NotFound(format!("invalid reference '{reference}': {e}")))?;

        if !self.allow_private_hosts && is_ssrf_target(&url) {
            return Err(FetchError::Blocked(format!("{url}: private or non-http target")));
        }

        debug!(%url, "fetching posting detail");
        let response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_transport(&url, timeout, e))?;

        let status = response.status();
        match status {
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                return Err(FetchError::Blocked(format!("{url}: HTTP {status}")));
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                return Err(FetchError::NotFound(format!("{url}: HTTP {status}")));
            }
            s if !s.is_success() => {
                return Err(FetchError::Transport(format!("{url}: HTTP {status}")));
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(&url, timeout, e))?;

        extract_detail(&body, &self.selectors)
            .ok_or_else(|| FetchError::NotFound(format!("{url}: no description element")))
    }
}

fn classify_transport(url: &Url, timeout: Duration, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Transport(format!("{url}: {e}"))
    }
}

/// Extract the first description element matching `selectors` as Markdown.
pub fn extract_detail(html: &str, selectors: &[String]) -> Option<String> {
    let doc = Html::parse_document(html);

    for raw in selectors {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let Some(element) = doc.select(&selector).next() else {
            continue;
        };

        let markdown = match htmd::convert(&element.inner_html()) {
            Ok(md) => md.trim().to_string(),
            Err(e) => {
                debug!(selector = %raw, error = %e, "markdown conversion failed");
                continue;
            }
        };
        if markdown.chars().count() > MIN_DETAIL_CHARS {
            return Some(markdown);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    if let Some(host) = url.host_str() {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return is_private_ip(&ip);
        }
        if host == "localhost" || host.ends_with(".local") || host.ends_with(".internal") {
            return true;
        }
    }

    false
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsignal_shared::default_detail_selectors;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DETAIL_PAGE: &str = r#"<html><body>
        <nav>Menu</nav>
        <div data-automation="jobAdDetails">
            <p>We are hiring a network engineer to look after our client sites.</p>
            <p><strong>Requirements</strong></p>
            <ul><li>CCNA certification</li><li>3+ years experience</li></ul>
        </div>
    </body></html>"#;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&default_detail_selectors())
            .unwrap()
            .allow_private_hosts()
    }

    async fn serve(server: &MockServer, route: &str, template: ResponseTemplate) -> PostingRef {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
        PostingRef::new(format!("{}{route}", server.uri()))
    }

    #[test]
    fn extract_detail_prefers_first_selector() {
        let md = extract_detail(DETAIL_PAGE, &default_detail_selectors()).expect("detail");
        assert!(md.contains("network engineer"));
        assert!(md.contains("CCNA certification"));
        assert!(!md.contains("Menu"));
    }

    #[test]
    fn extract_detail_rejects_short_text() {
        let html = r#"<div id="job-description">Apply now</div>"#;
        assert!(extract_detail(html, &default_detail_selectors()).is_none());
    }

    #[test]
    fn invalid_selector_is_config_error() {
        let err = HttpFetcher::new(&["[[".to_string()]).err().expect("error");
        assert!(err.is_config());
    }

    #[test]
    fn ssrf_checks() {
        assert!(is_ssrf_target(&Url::parse("file:///etc/passwd").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://10.0.0.1/").unwrap()));
        assert!(is_ssrf_target(&Url::parse("http://localhost:3000/job").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("https://www.seek.com.au/job/1").unwrap()));
    }

    #[tokio::test]
    async fn private_host_blocked_by_default() {
        let fetcher = HttpFetcher::new(&default_detail_selectors()).unwrap();
        let err = fetcher
            .fetch(&PostingRef::new("http://127.0.0.1:9/job"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "blocked");
    }

    #[tokio::test]
    async fn fetches_and_converts_detail() {
        let server = MockServer::start().await;
        let reference = serve(
            &server,
            "/job/1",
            ResponseTemplate::new(200).set_body_string(DETAIL_PAGE),
        )
        .await;

        let detail = fetcher()
            .fetch(&reference, Duration::from_secs(5))
            .await
            .expect("detail");
        assert!(detail.contains("CCNA certification"));
    }

    #[tokio::test]
    async fn maps_status_codes() {
        let server = MockServer::start().await;
        let forbidden = serve(&server, "/forbidden", ResponseTemplate::new(403)).await;
        let limited = serve(&server, "/limited", ResponseTemplate::new(429)).await;
        let gone = serve(&server, "/gone", ResponseTemplate::new(404)).await;
        let broken = serve(&server, "/broken", ResponseTemplate::new(500)).await;

        let f = fetcher();
        let t = Duration::from_secs(5);
        assert_eq!(f.fetch(&forbidden, t).await.unwrap_err().kind(), "blocked");
        assert_eq!(f.fetch(&limited, t).await.unwrap_err().kind(), "blocked");
        assert_eq!(f.fetch(&gone, t).await.unwrap_err().kind(), "not_found");
        assert_eq!(f.fetch(&broken, t).await.unwrap_err().kind(), "transport");
    }

    #[tokio::test]
    async fn missing_description_is_not_found() {
        let server = MockServer::start().await;
        let reference = serve(
            &server,
            "/empty",
            ResponseTemplate::new(200).set_body_string("<html><body><p>hi</p></body></html>"),
        )
        .await;

        let err = fetcher()
            .fetch(&reference, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;
        let reference = serve(
            &server,
            "/slow",
            ResponseTemplate::new(200)
                .set_body_string(DETAIL_PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .await;

        let err = fetcher()
            .fetch(&reference, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_millis(200)));
    }
}
