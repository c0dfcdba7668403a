//! Page fetching
//!
//! The crawler only depends on the [`Fetcher`] and [`Document`] traits. This
//! module also provides the HTTP implementation used by the binary:
//! - Building HTTP clients with the configured user agent and timeouts
//! - GET requests with status and transport error classification
//! - HTML documents whose links are extracted with `scraper`

use crate::config::{FetchConfig, UserAgentConfig};
use crate::crawler::parser::extract_links;
use crate::{ExtractError, FetchError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Downloads a URL into a [`Document`]
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<Box<dyn Document>, FetchError>;
}

/// A downloaded page
///
/// Extraction runs on a blocking thread, so implementations may do CPU-heavy
/// parsing here.
pub trait Document: Send + 'static {
    /// Returns the page's outbound links in document order
    fn extract_links(&self) -> Result<Vec<String>, ExtractError>;
}

/// Builds an HTTP client with the configured user agent and timeouts
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(fetch.timeout_secs))
        .connect_timeout(Duration::from_secs(fetch.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher from configuration
    pub fn from_config(
        user_agent: &UserAgentConfig,
        fetch: &FetchConfig,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(user_agent, fetch)?))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Box<dyn Document>, FetchError> {
        let target =
            Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Relative links resolve against where redirects ended up
        let final_url = response.url().to_string();

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.text().await.map_err(|e| classify_error(url, e))?;

        tracing::trace!(
            "Fetched {} ({}, {}, {} bytes)",
            url,
            status.as_u16(),
            content_type,
            body.len()
        );

        Ok(Box::new(HtmlDocument::new(
            final_url,
            body,
            is_html(status, &content_type),
        )))
    }
}

/// Maps transport failures onto [`FetchError`]
fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        FetchError::Connect {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else if error.is_builder() {
        FetchError::InvalidUrl(format!("{}: {}", url, error))
    } else {
        FetchError::Other {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

/// Treats a missing Content-Type as HTML
fn is_html(status: StatusCode, content_type: &str) -> bool {
    status != StatusCode::NO_CONTENT
        && (content_type.is_empty()
            || content_type.contains("text/html")
            || content_type.contains("application/xhtml+xml"))
}

/// A downloaded page body
///
/// Non-HTML responses are kept as documents without links: they count as
/// successfully visited but contribute nothing to the next level.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    base_url: String,
    body: String,
    html: bool,
}

impl HtmlDocument {
    pub fn new(base_url: impl Into<String>, body: impl Into<String>, html: bool) -> Self {
        Self {
            base_url: base_url.into(),
            body: body.into(),
            html,
        }
    }
}

impl Document for HtmlDocument {
    fn extract_links(&self) -> Result<Vec<String>, ExtractError> {
        if !self.html {
            return Ok(Vec::new());
        }

        let base = Url::parse(&self.base_url)
            .map_err(|e| ExtractError::InvalidBase(format!("{}: {}", self.base_url, e)))?;

        extract_links(&self.body, &base)
    }
}
