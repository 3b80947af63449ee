use std::env;
use std::sync::Arc;
use std::time::Duration;

use routewarden::core::config::load_engine_config;
use routewarden::{CrawlMode, Fetcher, Job, JobSpec, ProgressEvent, RateLimiter, ScopePolicy};
use tracing::{info, warn};

fn usage() -> &'static str {
    "usage: routewarden-server <seed_url> [seed_url...] [--mode only_crawl|only_scrape|crawl_scrape] \
     [--max-depth N] [--workers N] [--allow-subdomains] [--allow-domain HOST]"
}

struct Args {
    seeds: Vec<String>,
    mode: CrawlMode,
    max_depth: usize,
    workers: usize,
    allow_subdomains: bool,
    allowed_domains: Vec<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut seeds = Vec::new();
    let mut mode = CrawlMode::default();
    let mut max_depth = routewarden::core::config::MAX_DEPTH;
    let mut workers = routewarden::core::config::MIN_WORKERS;
    let mut allow_subdomains = false;
    let mut allowed_domains = Vec::new();

    let mut args = env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let value = args.next().ok_or("--mode requires a value")?;
                mode = match value.as_str() {
                    "only_crawl" => CrawlMode::OnlyCrawl,
                    "only_scrape" => CrawlMode::OnlyScrape,
                    "crawl_scrape" => CrawlMode::CrawlScrape,
                    other => return Err(format!("unknown mode '{other}'")),
                };
            }
            "--max-depth" => {
                let value = args.next().ok_or("--max-depth requires a value")?;
                max_depth = value.parse().map_err(|_| "invalid --max-depth")?;
            }
            "--workers" => {
                let value = args.next().ok_or("--workers requires a value")?;
                workers = value.parse().map_err(|_| "invalid --workers")?;
            }
            "--allow-subdomains" => allow_subdomains = true,
            "--allow-domain" => {
                let value = args.next().ok_or("--allow-domain requires a value")?;
                allowed_domains.push(value);
            }
            "--help" | "-h" => return Err(usage().to_string()),
            other => seeds.push(other.to_string()),
        }
    }

    if seeds.is_empty() {
        return Err(usage().to_string());
    }

    Ok(Args {
        seeds,
        mode,
        max_depth,
        workers,
        allow_subdomains,
        allowed_domains,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if env::var("DEBUG").map(|v| v == "1").unwrap_or(false) {
            "debug".to_string()
        } else {
            env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
        };
        tracing_subscriber::EnvFilter::new(level)
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let engine_config = load_engine_config();
    let fetcher = Arc::new(Fetcher::new(
        Duration::from_secs(engine_config.request_timeout_secs),
        engine_config.connection_pool_size,
        engine_config.max_retries,
    ));
    let rate_limiter = RateLimiter::new(
        Duration::from_secs_f64(engine_config.default_delay_secs),
        Duration::from_secs_f64(engine_config.max_delay_secs),
    );

    let job_spec = JobSpec {
        seed_urls: args.seeds,
        mode: args.mode,
        max_depth: args.max_depth,
        worker_count: args.workers,
        allow_subdomains: args.allow_subdomains,
        allowed_domains: args.allowed_domains,
        include_child_pages: true,
        include_patterns: Vec::new(),
        exclude_patterns: ScopePolicy::default_excludes(),
        allowed_path_prefixes: Vec::new(),
    };

    let job = Arc::new(Job::new("cli", job_spec, &engine_config, fetcher, rate_limiter)?);
    let mut events = job.subscribe().await;
    job.start().await?;

    let progress_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::PageComplete(page) => {
                    info!(url = %page.url, status = ?page.status, depth = page.depth, "page complete");
                }
                ProgressEvent::StatusUpdate(snapshot) => {
                    info!(
                        processed = snapshot.urls_processed,
                        discovered = snapshot.urls_discovered,
                        depth = snapshot.current_depth,
                        "status"
                    );
                }
                ProgressEvent::JobCompleted(_) | ProgressEvent::JobFailed(_) => break,
                ProgressEvent::SubscriberOverflow => {
                    warn!("progress subscriber overflowed, events may have been dropped");
                    break;
                }
                ProgressEvent::InitialStatus(_) => {}
            }
        }
    });

    job.wait_until_terminal(Duration::from_millis(150)).await;
    let _ = progress_task.await;

    let result = job.result().await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
