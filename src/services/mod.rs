//! External service integrations

pub mod logging;
pub mod metadata;
pub mod rate_limiter;
pub mod youtube;

pub use logging::init_tracing;
pub use metadata::{MetadataError, MetadataSource, VideoMetadata};
pub use rate_limiter::RateLimitConfig;
pub use youtube::YouTubeClient;
