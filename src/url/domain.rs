use crate::UrlParseError;
use url::Url;

/// Extracts the host from a URL string
///
/// The host is the lowercased host portion of the URL's authority, without
/// the port. It is only used as the per-host admission key, so two URLs that
/// differ only in port share a host.
///
/// # Arguments
///
/// * `url` - The URL to extract the host from
///
/// # Returns
///
/// * `Ok(String)` - The lowercase host
/// * `Err(UrlParseError)` - If the URL is malformed or has no host
///
/// # Examples
///
/// ```
/// use level_crawler::url::extract_host;
///
/// assert_eq!(extract_host("https://example.com/path").unwrap(), "example.com");
/// assert_eq!(extract_host("https://EXAMPLE.COM:8080/").unwrap(), "example.com");
/// assert!(extract_host("not a url").is_err());
/// ```
pub fn extract_host(url: &str) -> Result<String, UrlParseError> {
    let parsed = Url::parse(url).map_err(|e| UrlParseError::Parse(format!("{}: {}", url, e)))?;

    parsed
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or_else(|| UrlParseError::MissingHost(url.to_string()))
}
