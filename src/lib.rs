pub mod core;
pub mod extractor;
pub mod fetcher;
pub mod frontier;
pub mod job;
pub mod progress;
pub mod rate_limiter;
pub mod robots;
pub mod scheduler;
pub mod url_scope;
pub mod worker_pool;

pub use core::{EngineConfig, Failure, FailurePhase, FailureType, JobError};
pub use core::types::*;
pub use extractor::{Extracted, ExtractedLinks, Extractor};
pub use fetcher::{FetchError, FetchedPage, Fetcher};
pub use frontier::{AdmitOutcome, Frontier, FrontierEntry};
pub use job::{Job, JobSpec};
pub use progress::{ProgressBus, ProgressEvent};
pub use rate_limiter::RateLimiter;
pub use robots::RobotsCache;
pub use scheduler::{MultiJobSpec, MultiScopeScheduler, ScopeSpec};
pub use url_scope::ScopePolicy;
