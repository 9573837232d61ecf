pub mod apply;
pub mod browser;
pub mod config;
pub mod error;
pub mod model;
pub mod search;
pub mod service;
pub mod session;
pub mod sqlite;

pub use apply::{
    ApplicationHistory, BatchApplyCoordinator, ChannelCodeSource, Credentials, NoCodeSource,
    Platform, PlatformApplier, SearchFilters, VerificationCodeSource,
};
pub use config::{load_config, DataProviderMode, JobPilotConfig};
pub use error::{ConfigError, Result};
pub use model::{
    ApiResponse, ApplicationResult, BatchApplyReport, JobPosting, PostingKind, SearchOutcome,
    UserInfo,
};
pub use search::{JobNormalizer, SearchOrchestrator};
pub use service::{ApplyRequest, BatchApplyRequest, JobService, SearchRequest, ServiceError};
pub use session::{SessionInfo, SessionStore};
