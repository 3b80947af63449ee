//! Two scopes with disjoint path prefixes, seeded under the same host,
//! where a cross-scope link is out of scope for the scope that does
//! not own it.

use std::sync::Arc;
use std::time::Duration;

use routewarden::core::config::EngineConfig;
use routewarden::core::types::CrawlMode;
use routewarden::{Fetcher, MultiJobSpec, MultiScopeScheduler, RateLimiter, ScopeSpec};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &str = "A full paragraph of readable article body content, long enough that \
    the readability extractor treats it as the main text rather than discarding it.";

#[tokio::test]
async fn scopes_with_disjoint_prefixes_stay_isolated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a/i"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body><article><p>{BODY}</p></article><a href="/b/j">cross</a></body></html>"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b/j"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><body><article><p>{BODY}</p></article></body></html>"
        )))
        .mount(&server)
        .await;

    let uri = server.uri();
    let host = url::Url::parse(&uri).unwrap().host_str().unwrap().to_string();

    let spec = MultiJobSpec {
        domain: host,
        scopes: vec![
            ScopeSpec {
                id: "s1".to_string(),
                name: "Scope One".to_string(),
                entry_urls: vec![format!("{uri}/a/i")],
                active: true,
                max_depth: None,
            },
            ScopeSpec {
                id: "s2".to_string(),
                name: "Scope Two".to_string(),
                entry_urls: vec![format!("{uri}/b/j")],
                active: true,
                max_depth: None,
            },
        ],
        mode: CrawlMode::CrawlScrape,
        max_depth: 2,
        worker_count: 2,
        allow_subdomains: false,
        include_child_pages: true,
        parallel_kbs: 2,
    };

    let fetcher = Arc::new(Fetcher::new(Duration::from_secs(5), 10, 1));
    let limiter = RateLimiter::new(Duration::from_millis(1), Duration::from_millis(50));
    let scheduler = MultiScopeScheduler::new(spec, &EngineConfig::default(), fetcher, limiter).unwrap();
    assert!(scheduler.overlapping_scopes().is_empty());

    scheduler.start().await.unwrap();
    scheduler.wait_until_terminal(Duration::from_millis(20)).await;

    let s1 = scheduler.job("s1").unwrap().result().await;
    let s2 = scheduler.job("s2").unwrap().result().await;

    assert_eq!(s1.results.len(), 1);
    assert!(s1.results[0].url.ends_with("/a/i"));
    assert_eq!(s1.snapshot.urls_skipped_out_of_scope, 1);

    assert_eq!(s2.results.len(), 1);
    assert!(s2.results[0].url.ends_with("/b/j"));
}
