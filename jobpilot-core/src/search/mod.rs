pub mod normalizer;
pub mod orchestrator;
pub mod platform;
pub mod providers;
pub mod recent;
pub mod retry;

pub use normalizer::{stable_hash, EntryPolicy, JobNormalizer, RawJob};
pub use orchestrator::{build_provider, SearchOrchestrator};
pub use providers::{
    CacheProvider, JobProvider, ProviderError, ProviderResult, ProviderTier, SearchQuery,
};
pub use recent::RecentJobs;
pub use retry::{RetryOutcome, RetryPolicy};
