//! Integration tests for the crawler
//!
//! Most tests crawl an in-memory web graph through a mock fetcher that
//! records every download and the peak concurrency it observed. The last
//! tests use wiremock to run the HTTP fetcher end-to-end.

use async_trait::async_trait;
use level_crawler::config::{CrawlerConfig, FetchConfig, UserAgentConfig};
use level_crawler::crawler::{CrawlResult, Document, Fetcher, HttpFetcher, WebCrawler};
use level_crawler::url::{extract_host, Exclusions};
use level_crawler::{ExtractError, FetchError, UrlError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A page in the mock web
#[derive(Clone)]
enum Page {
    Links(Vec<String>),
    BrokenLinks,
}

/// Tracks current and peak concurrency
#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// In-memory web graph; URLs that are not in the graph fail to download
struct MockWeb {
    pages: HashMap<String, Page>,
    fetch_delay: Duration,
    extract_delay: Duration,
    fetch_log: Mutex<Vec<String>>,
    downloads: Gauge,
    extractions: Arc<Gauge>,
    per_host: Mutex<HashMap<String, (usize, usize)>>,
}

impl MockWeb {
    fn new(pages: &[(&str, Page)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(url, page)| (url.to_string(), page.clone()))
                .collect(),
            fetch_delay: Duration::ZERO,
            extract_delay: Duration::ZERO,
            fetch_log: Mutex::new(Vec::new()),
            downloads: Gauge::default(),
            extractions: Arc::new(Gauge::default()),
            per_host: Mutex::new(HashMap::new()),
        }
    }

    fn with_delays(mut self, fetch: Duration, extract: Duration) -> Self {
        self.fetch_delay = fetch;
        self.extract_delay = extract;
        self
    }

    fn fetched(&self) -> Vec<String> {
        self.fetch_log.lock().unwrap().clone()
    }

    fn peak_per_host(&self) -> HashMap<String, usize> {
        self.per_host
            .lock()
            .unwrap()
            .iter()
            .map(|(host, (_, peak))| (host.clone(), *peak))
            .collect()
    }

    fn enter_host(&self, host: &str) {
        let mut hosts = self.per_host.lock().unwrap();
        let (current, peak) = hosts.entry(host.to_string()).or_insert((0, 0));
        *current += 1;
        *peak = (*peak).max(*current);
    }

    fn exit_host(&self, host: &str) {
        let mut hosts = self.per_host.lock().unwrap();
        if let Some((current, _)) = hosts.get_mut(host) {
            *current -= 1;
        }
    }
}

struct MockDocument {
    page: Page,
    delay: Duration,
    extractions: Arc<Gauge>,
}

impl Document for MockDocument {
    fn extract_links(&self) -> Result<Vec<String>, ExtractError> {
        self.extractions.enter();
        std::thread::sleep(self.delay);
        self.extractions.exit();

        match &self.page {
            Page::Links(links) => Ok(links.clone()),
            Page::BrokenLinks => Err(ExtractError::Parse("unparseable page".to_string())),
        }
    }
}

#[async_trait]
impl Fetcher for MockWeb {
    async fn fetch(&self, url: &str) -> Result<Box<dyn Document>, FetchError> {
        self.fetch_log.lock().unwrap().push(url.to_string());
        let host = extract_host(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        self.downloads.enter();
        self.enter_host(&host);
        tokio::time::sleep(self.fetch_delay).await;
        self.exit_host(&host);
        self.downloads.exit();

        match self.pages.get(url) {
            Some(page) => Ok(Box::new(MockDocument {
                page: page.clone(),
                delay: self.extract_delay,
                extractions: Arc::clone(&self.extractions),
            })),
            None => Err(FetchError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

fn links(urls: &[&str]) -> Page {
    Page::Links(urls.iter().map(|u| u.to_string()).collect())
}

fn test_config(downloads: usize, extractors: usize, per_host: usize) -> CrawlerConfig {
    CrawlerConfig {
        downloads,
        extractors,
        per_host,
        shutdown_grace_secs: 5,
        ..CrawlerConfig::default()
    }
}

fn crawler_for(web: &Arc<MockWeb>) -> WebCrawler {
    WebCrawler::new(web.clone(), &test_config(4, 2, 2)).expect("valid config")
}

fn set(urls: &[&str]) -> HashSet<String> {
    urls.iter().map(|u| u.to_string()).collect()
}

fn visited(result: &CrawlResult) -> HashSet<String> {
    result.visited.iter().cloned().collect()
}

/// Checks the result invariants that hold for every crawl
fn assert_result_invariants(result: &CrawlResult) {
    for (url, _) in result.fetch_errors() {
        assert!(
            !result.visited.contains(url),
            "{} failed to download but is visited",
            url
        );
    }
    for (url, _) in result.extract_errors() {
        assert!(
            result.visited.contains(url),
            "{} failed extraction but was not visited",
            url
        );
    }
}

#[tokio::test]
async fn test_depth_zero_is_empty() {
    let web = Arc::new(MockWeb::new(&[("http://a.com/", links(&["http://a.com/b"]))]));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("http://a.com/", 0, &Exclusions::default()).await;

    assert!(result.is_empty());
    assert!(web.fetched().is_empty());
    crawler.close().await;
}

#[tokio::test]
async fn test_excluded_seed_is_empty() {
    let web = Arc::new(MockWeb::new(&[("http://ads.com/", links(&[]))]));
    let crawler = crawler_for(&web);

    let result = crawler
        .crawl("http://ads.com/", 3, &Exclusions::new(["ads"]))
        .await;

    assert!(result.is_empty());
    assert!(web.fetched().is_empty());
    crawler.close().await;
}

#[tokio::test]
async fn test_empty_exclusion_excludes_the_seed() {
    let web = Arc::new(MockWeb::new(&[("http://a.com/", links(&["http://a.com/b"]))]));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("http://a.com/", 1, &Exclusions::new([""])).await;

    assert!(result.is_empty());
    assert!(web.fetched().is_empty());
    crawler.close().await;
}

#[tokio::test]
async fn test_empty_seed_is_empty() {
    let web = Arc::new(MockWeb::new(&[]));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("", 3, &Exclusions::default()).await;

    assert!(result.is_empty());
    crawler.close().await;
}

#[tokio::test]
async fn test_last_level_links_are_not_followed() {
    let web = Arc::new(MockWeb::new(&[
        ("http://a.com/A", links(&["http://a.com/B", "http://a.com/C"])),
        ("http://a.com/B", links(&["http://a.com/D"])),
        ("http://a.com/C", links(&[])),
        ("http://a.com/D", links(&[])),
    ]));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("http://a.com/A", 2, &Exclusions::default()).await;

    assert_eq!(
        visited(&result),
        set(&["http://a.com/A", "http://a.com/B", "http://a.com/C"])
    );
    assert!(result.errors.is_empty());
    assert!(!web.fetched().contains(&"http://a.com/D".to_string()));
    crawler.close().await;
}

#[tokio::test]
async fn test_failed_download_is_not_visited() {
    let web = Arc::new(MockWeb::new(&[(
        "http://a.com/A",
        links(&["http://a.com/B"]),
    )]));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("http://a.com/A", 3, &Exclusions::default()).await;

    assert_eq!(visited(&result), set(&["http://a.com/A"]));
    assert_eq!(result.errors.len(), 1);
    assert!(matches!(
        result.errors.get("http://a.com/B"),
        Some(UrlError::Fetch(FetchError::Connect { .. }))
    ));
    assert_result_invariants(&result);
    crawler.close().await;
}

#[tokio::test]
async fn test_unreachable_seed() {
    let web = Arc::new(MockWeb::new(&[]));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("http://down.com/", 2, &Exclusions::default()).await;

    assert!(result.visited.is_empty());
    assert!(result.errors["http://down.com/"].is_fetch());
    crawler.close().await;
}

#[tokio::test]
async fn test_excluded_links_never_appear() {
    let web = Arc::new(MockWeb::new(&[
        (
            "http://a.com/A",
            links(&["http://a.com/B", "http://ads.example.com/banner"]),
        ),
        ("http://a.com/B", links(&["http://ads.example.com/other"])),
    ]));
    let crawler = crawler_for(&web);

    let result = crawler
        .crawl("http://a.com/A", 3, &Exclusions::new(["ads"]))
        .await;

    assert_eq!(visited(&result), set(&["http://a.com/A", "http://a.com/B"]));
    assert!(result.errors.is_empty());
    assert!(web.fetched().iter().all(|url| !url.contains("ads")));
    crawler.close().await;
}

#[tokio::test]
async fn test_extraction_failure_keeps_url_visited() {
    let web = Arc::new(MockWeb::new(&[
        ("http://a.com/A", links(&["http://a.com/B", "http://a.com/C"])),
        ("http://a.com/B", Page::BrokenLinks),
        ("http://a.com/C", links(&["http://a.com/D"])),
        ("http://a.com/D", links(&[])),
    ]));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("http://a.com/A", 3, &Exclusions::default()).await;

    assert_eq!(
        visited(&result),
        set(&[
            "http://a.com/A",
            "http://a.com/B",
            "http://a.com/C",
            "http://a.com/D"
        ])
    );
    assert!(matches!(
        result.errors.get("http://a.com/B"),
        Some(UrlError::Extract(ExtractError::Parse(_)))
    ));
    assert_eq!(result.errors.len(), 1);
    assert_result_invariants(&result);
    crawler.close().await;
}

/// A graph with shared children, back links and broken pages
fn tangled_web() -> MockWeb {
    MockWeb::new(&[
        (
            "http://a.com/",
            links(&["http://a.com/1", "http://b.com/1", "http://c.com/1"]),
        ),
        (
            "http://a.com/1",
            links(&["http://b.com/1", "http://a.com/", "http://a.com/2"]),
        ),
        (
            "http://b.com/1",
            links(&["http://a.com/1", "http://b.com/2", "http://gone.com/"]),
        ),
        ("http://c.com/1", Page::BrokenLinks),
        ("http://a.com/2", links(&["http://b.com/2", "http://c.com/2"])),
        ("http://b.com/2", links(&["http://a.com/", "http://c.com/2"])),
        ("http://c.com/2", links(&["http://a.com/3"])),
        ("http://a.com/3", links(&[])),
    ])
}

#[tokio::test]
async fn test_each_url_downloaded_at_most_once() {
    let web = Arc::new(tangled_web().with_delays(Duration::from_millis(2), Duration::ZERO));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("http://a.com/", 4, &Exclusions::default()).await;

    let fetched = web.fetched();
    let unique: HashSet<_> = fetched.iter().collect();
    assert_eq!(fetched.len(), unique.len(), "duplicate downloads: {:?}", fetched);
    assert_result_invariants(&result);
    crawler.close().await;
}

#[tokio::test]
async fn test_repeated_crawls_are_identical() {
    let web = Arc::new(tangled_web().with_delays(Duration::from_millis(1), Duration::ZERO));
    let crawler = crawler_for(&web);

    let first = crawler.crawl("http://a.com/", 4, &Exclusions::default()).await;
    let second = crawler.crawl("http://a.com/", 4, &Exclusions::default()).await;

    assert_eq!(first.visited, second.visited);
    assert_eq!(first.errors, second.errors);
    assert_eq!(
        visited(&first),
        set(&[
            "http://a.com/",
            "http://a.com/1",
            "http://b.com/1",
            "http://c.com/1",
            "http://a.com/2",
            "http://b.com/2",
            "http://c.com/2",
        ])
    );
    assert!(first.errors["http://gone.com/"].is_fetch());
    assert!(first.errors["http://c.com/1"].is_extract());
    crawler.close().await;
}

#[tokio::test]
async fn test_levels_complete_in_order() {
    let children: Vec<String> = (0..6).map(|i| format!("http://h{}.com/", i)).collect();
    let grandchildren: Vec<String> = (0..6).map(|i| format!("http://h{}.com/leaf", i)).collect();

    let mut pages = vec![(
        "http://root.com/".to_string(),
        Page::Links(children.clone()),
    )];
    for (child, leaf) in children.iter().zip(&grandchildren) {
        pages.push((child.clone(), Page::Links(vec![leaf.clone()])));
        pages.push((leaf.clone(), Page::Links(vec![])));
    }
    let pages: Vec<(&str, Page)> = pages.iter().map(|(u, p)| (u.as_str(), p.clone())).collect();

    // Uneven extraction times so a fast level-1 extraction would race ahead
    // without the barrier
    let web = Arc::new(MockWeb::new(&pages).with_delays(
        Duration::from_millis(5),
        Duration::from_millis(3),
    ));
    let crawler = crawler_for(&web);

    let result = crawler.crawl("http://root.com/", 3, &Exclusions::default()).await;
    assert_eq!(result.visited.len(), 13);

    let fetched = web.fetched();
    let position = |url: &String| fetched.iter().position(|f| f == url).unwrap();
    let last_child = children.iter().map(position).max().unwrap();
    let first_leaf = grandchildren.iter().map(position).min().unwrap();
    assert!(
        last_child < first_leaf,
        "a level-2 download started before level 1 finished: {:?}",
        fetched
    );
    crawler.close().await;
}

#[tokio::test]
async fn test_concurrency_caps_are_respected() {
    let hosts = ["a.com", "b.com", "c.com"];
    let mut pages: Vec<(String, Page)> = Vec::new();
    let mut seed_links = Vec::new();
    for host in hosts {
        for i in 0..8 {
            let url = format!("http://{}/{}", host, i);
            seed_links.push(url.clone());
            pages.push((url, Page::Links(vec![format!("http://{}/{}/leaf", host, i)])));
            pages.push((format!("http://{}/{}/leaf", host, i), Page::Links(vec![])));
        }
    }
    pages.push(("http://a.com/".to_string(), Page::Links(seed_links)));
    let pages: Vec<(&str, Page)> = pages.iter().map(|(u, p)| (u.as_str(), p.clone())).collect();

    let web = Arc::new(MockWeb::new(&pages).with_delays(
        Duration::from_millis(10),
        Duration::from_millis(5),
    ));
    let crawler = WebCrawler::new(web.clone(), &test_config(5, 2, 2)).unwrap();

    let result = crawler.crawl("http://a.com/", 3, &Exclusions::default()).await;
    crawler.close().await;

    assert_eq!(result.visited.len(), 49);
    assert!(result.errors.is_empty());

    assert!(web.downloads.peak() <= 5, "download peak {}", web.downloads.peak());
    assert!(web.downloads.peak() >= 2);
    assert!(web.extractions.peak() <= 2, "extraction peak {}", web.extractions.peak());
    for (host, peak) in web.peak_per_host() {
        assert!(peak <= 2, "host {} peaked at {}", host, peak);
    }
}

#[tokio::test]
async fn test_per_host_cap_of_one_serializes_a_host() {
    let leaves: Vec<String> = (0..6).map(|i| format!("http://solo.com/{}", i)).collect();
    let mut pages = vec![("http://solo.com/".to_string(), Page::Links(leaves.clone()))];
    for leaf in &leaves {
        pages.push((leaf.clone(), Page::Links(vec![])));
    }
    let pages: Vec<(&str, Page)> = pages.iter().map(|(u, p)| (u.as_str(), p.clone())).collect();

    let web = Arc::new(MockWeb::new(&pages).with_delays(Duration::from_millis(5), Duration::ZERO));
    let crawler = WebCrawler::new(web.clone(), &test_config(8, 4, 1)).unwrap();

    let result = crawler.crawl("http://solo.com/", 2, &Exclusions::default()).await;
    crawler.close().await;

    assert_eq!(result.visited.len(), 7);
    assert_eq!(web.peak_per_host()["solo.com"], 1);
}

#[tokio::test]
async fn test_crawl_after_close_downloads_nothing() {
    let web = Arc::new(MockWeb::new(&[("http://a.com/", links(&[]))]));
    let crawler = crawler_for(&web);
    crawler.close().await;

    let result = crawler.crawl("http://a.com/", 2, &Exclusions::default()).await;

    assert!(result.visited.is_empty());
    assert!(web.fetched().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_during_crawl_cancels_remaining_work() {
    let hosts = ["a.com", "b.com", "c.com", "d.com"];
    let mut pages: Vec<(String, Page)> = Vec::new();
    let mut seed_links = Vec::new();
    for host in hosts {
        for i in 0..10 {
            let url = format!("http://{}/{}", host, i);
            seed_links.push(url.clone());
            pages.push((url, Page::Links(vec![format!("http://{}/{}/leaf", host, i)])));
        }
    }
    pages.push(("http://seed.com/".to_string(), Page::Links(seed_links.clone())));
    let pages: Vec<(&str, Page)> = pages.iter().map(|(u, p)| (u.as_str(), p.clone())).collect();

    let web = Arc::new(MockWeb::new(&pages).with_delays(
        Duration::from_millis(300),
        Duration::from_millis(20),
    ));
    let config = CrawlerConfig {
        shutdown_grace_secs: 1,
        ..test_config(4, 2, 2)
    };
    let crawler = Arc::new(WebCrawler::new(web.clone(), &config).unwrap());

    let handle = {
        let crawler = Arc::clone(&crawler);
        tokio::spawn(async move {
            crawler
                .crawl("http://seed.com/", 3, &Exclusions::default())
                .await
        })
    };

    // The seed is done and level 1 is part way through
    tokio::time::sleep(Duration::from_millis(750)).await;

    let started = std::time::Instant::now();
    crawler.close().await;
    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(1500),
        "close took {:?}",
        elapsed
    );

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("crawl finishes after close")
        .unwrap();

    assert!(result.visited.contains("http://seed.com/"));
    assert!(result.visited.len() < 41, "close did not stop the crawl");
    assert_result_invariants(&result);

    let cancelled: Vec<&String> = result
        .fetch_errors()
        .filter(|(_, e)| matches!(e, UrlError::Fetch(FetchError::Cancelled { .. })))
        .map(|(url, _)| url)
        .collect();
    assert!(!cancelled.is_empty());
    for url in &cancelled {
        assert!(!result.visited.contains(*url));
    }

    // Every link of the seed was either downloaded or reported
    for url in &seed_links {
        assert!(
            result.visited.contains(url) || result.errors.contains_key(url),
            "{} was neither visited nor reported",
            url
        );
    }
}

fn http_fetcher() -> HttpFetcher {
    let fetch = FetchConfig {
        timeout_secs: 5,
        connect_timeout_secs: 2,
    };
    HttpFetcher::from_config(&UserAgentConfig::default(), &fetch).expect("client builds")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

#[tokio::test]
async fn test_http_crawl_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(&format!(
            r#"<a href="{0}/page1">1</a>
               <a href="/page2">2</a>
               <a href="{0}/missing">missing</a>
               <a href="{0}/ads/banner">ad</a>
               <a href="mailto:someone@example.com">mail</a>"#,
            base_url
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html(r#"<a href="/deep">deep</a>"#))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("%PDF-1.4")
                .insert_header("content-type", "application/pdf"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/deep"))
        .respond_with(html(""))
        .expect(0)
        .mount(&mock_server)
        .await;

    let crawler = WebCrawler::new(Arc::new(http_fetcher()), &test_config(4, 2, 2)).unwrap();
    let seed = format!("{}/", base_url);

    let result = crawler.crawl(&seed, 2, &Exclusions::new(["/ads/"])).await;
    crawler.close().await;

    assert_eq!(
        visited(&result),
        HashSet::from([
            seed.clone(),
            format!("{}/page1", base_url),
            format!("{}/page2", base_url),
        ])
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors.get(&format!("{}/missing", base_url)),
        Some(&UrlError::Fetch(FetchError::Status {
            url: format!("{}/missing", base_url),
            status: 404,
        }))
    );
}

#[tokio::test]
async fn test_http_missing_seed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let crawler = WebCrawler::new(Arc::new(http_fetcher()), &test_config(2, 1, 1)).unwrap();
    let seed = format!("{}/", mock_server.uri());

    let result = crawler.crawl(&seed, 2, &Exclusions::default()).await;
    crawler.close().await;

    assert!(result.visited.is_empty());
    assert!(matches!(
        result.errors.get(&seed),
        Some(UrlError::Fetch(FetchError::Status { status: 503, .. }))
    ));
}
