//! End-to-end Job scenarios against a mocked HTTP server, run without
//! any real network access.

use std::sync::Arc;
use std::time::Duration;

use routewarden::core::config::EngineConfig;
use routewarden::core::types::{JobState, PageCategory, PageStatus};
use routewarden::{CrawlMode, Fetcher, FailureType, Job, JobSpec, RateLimiter, ScopePolicy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn fast_fetcher() -> Arc<Fetcher> {
    Arc::new(Fetcher::new(Duration::from_secs(5), 10, 1))
}

fn fast_limiter() -> RateLimiter {
    RateLimiter::new(Duration::from_millis(1), Duration::from_millis(50))
}

async fn run_job(spec: JobSpec) -> Arc<Job> {
    let job = Arc::new(
        Job::new("test", spec, &EngineConfig::default(), fast_fetcher(), fast_limiter()).unwrap(),
    );
    job.start().await.unwrap();
    job.wait_until_terminal(Duration::from_millis(20)).await;
    job
}

const PAGE_BODY: &str = "This is a full paragraph of readable article body content, \
    long enough that the readability extractor treats it as the main text of the page \
    rather than discarding it as boilerplate noise.";

/// `/` links to `/b` twice (canonical-equal); with max_depth=2,
/// worker_count=2, crawl_scrape mode: exactly 2 page results and
/// urls_discovered = 2 — the duplicate target is admitted to the
/// frontier once. `links_found` counts anchors before dedup, so `/`
/// reports 2 even though only one child is enqueued.
#[tokio::test]
async fn scenario_1_duplicate_links_are_deduped() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><head><title>Root</title></head><body><article><p>{PAGE_BODY}</p></article>
               <a href="/b">one</a><a href="/b">two</a></body></html>"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><head><title>B</title></head><body><article><p>{PAGE_BODY}</p></article></body></html>"
        )))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        mode: CrawlMode::CrawlScrape,
        max_depth: 2,
        worker_count: 2,
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 2);
    assert_eq!(result.snapshot.urls_discovered, 2);
    let root = result.results.iter().find(|r| r.depth == 0).unwrap();
    assert_eq!(root.links_found, 2);
    assert_eq!(result.snapshot.state, JobState::Completed);
}

/// Scenario 2: a link to an external host is neither fetched nor
/// recorded, and is counted as out-of-scope.
#[tokio::test]
async fn scenario_2_external_links_are_out_of_scope() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><head><title>Root</title></head><body><article><p>{PAGE_BODY}</p></article>
               <a href="http://other.test/x">external</a></body></html>"#
        )))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        mode: CrawlMode::CrawlScrape,
        max_depth: 2,
        worker_count: 2,
        allow_subdomains: false,
        allowed_domains: Vec::new(),
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 1);
    assert_eq!(result.snapshot.urls_skipped_out_of_scope, 1);
}

/// Scenario 4: a 404 root produces a crawl-phase `http_4xx` failure
/// and the Job still reaches `Completed`, not `Failed`.
#[tokio::test]
async fn scenario_4_404_is_a_page_failure_not_a_job_failure() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 1);
    let page = &result.results[0];
    assert_eq!(page.status, PageStatus::Error);
    assert_eq!(page.category, PageCategory::Error);
    assert_eq!(page.failure.failure_type, FailureType::Http4xx);
    assert_eq!(page.failure.http_status, Some(404));
    assert_eq!(result.snapshot.state, JobState::Completed);
}

/// Scenario 5: a seed disallowed by robots.txt produces a
/// `robots_blocked` failure, enqueues no children, and the Job
/// completes with zero successful pages.
#[tokio::test]
async fn scenario_5_robots_disallowed_seed_completes_with_no_successes() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><body><article><p>{PAGE_BODY}</p></article></body></html>"
        )))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].failure.failure_type, FailureType::RobotsBlocked);
    assert_eq!(result.snapshot.state, JobState::Completed);
    assert!(result.results.iter().all(|r| r.category == PageCategory::Error));
}

/// `only_scrape` mode fetches the seed only; no children are enqueued
/// even though the page has links.
#[tokio::test]
async fn only_scrape_mode_does_not_enqueue_children() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><article><p>{PAGE_BODY}</p></article><a href="/b">b</a></body></html>"#
        )))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        mode: CrawlMode::OnlyScrape,
        max_depth: 3,
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].status, PageStatus::Scraped);
    assert_eq!(result.results[0].links_found, 1);
}

/// `only_crawl` mode follows links but does not retain page content.
#[tokio::test]
async fn only_crawl_mode_does_not_retain_content() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><body><article><p>{PAGE_BODY}</p></article></body></html>"
        )))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        mode: CrawlMode::OnlyCrawl,
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].status, PageStatus::Crawled);
    assert!(!result.results[0].has_content);
    assert!(result.results[0].content.is_empty());
}

/// `only_crawl` mode on a page with no readable main text (an
/// image-only link hub) still yields `status=crawled` and enqueues the
/// page's anchors — it must not be gated on content extraction.
#[tokio::test]
async fn only_crawl_mode_follows_links_on_empty_content_page() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><a href="/b"><img src="/a.png"></a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><body><article><p>{PAGE_BODY}</p></article></body></html>"
        )))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        mode: CrawlMode::OnlyCrawl,
        max_depth: 2,
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 2);
    let root = result.results.iter().find(|r| r.depth == 0).unwrap();
    assert_eq!(root.status, PageStatus::Crawled);
    assert_eq!(root.links_found, 1);
    assert!(root.content.is_empty());
}

/// A valid seed among an otherwise invalid list still starts the job:
/// construction only fails the whole job if *no* seed canonicalizes
/// and satisfies the scope policy.
#[tokio::test]
async fn job_rejects_construction_when_no_seed_is_valid() {
    let spec = JobSpec {
        seed_urls: vec!["not a url".to_string(), "javascript:alert(1)".to_string()],
        ..Default::default()
    };
    let err = Job::new("bad", spec, &EngineConfig::default(), fast_fetcher(), fast_limiter())
        .unwrap_err();
    assert!(matches!(err, routewarden::JobError::NoValidSeeds));
}

/// With max_depth=1 a two-hop chain only records depths 0 and 1,
/// never admitting the depth-2 page.
#[tokio::test]
async fn depth_bound_is_enforced() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><article><p>{PAGE_BODY}</p></article><a href="/a">a</a></body></html>"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><article><p>{PAGE_BODY}</p></article><a href="/b">b</a></body></html>"#
        )))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        mode: CrawlMode::CrawlScrape,
        max_depth: 1,
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 2);
    assert!(result.results.iter().all(|r| r.depth <= 1));
    assert!(result.results.iter().any(|r| r.url.ends_with("/a")));
    assert!(!result.results.iter().any(|r| r.url.ends_with("/b")));
}

/// The scope policy's `default_excludes` keep a constructed job from
/// ever fetching an excluded path like `/login`.
#[tokio::test]
async fn default_excludes_block_login_paths() {
    init_logger();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><article><p>{PAGE_BODY}</p></article><a href="/login">login</a></body></html>"#
        )))
        .mount(&server)
        .await;

    let spec = JobSpec {
        seed_urls: vec![server.uri()],
        mode: CrawlMode::CrawlScrape,
        exclude_patterns: ScopePolicy::default_excludes(),
        ..Default::default()
    };
    let job = run_job(spec).await;
    let result = job.result().await;

    assert_eq!(result.results.len(), 1);
    assert_eq!(result.snapshot.urls_skipped_out_of_scope, 1);
}
