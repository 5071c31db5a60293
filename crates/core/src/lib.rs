pub mod cache;
pub mod config;
pub mod domain;
pub mod reporting;
pub mod session;

pub use cache::{namespaced_key, CacheStats, CacheTtls, TtlCache};
pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use reporting::{EventFilter, FunnelMetrics, MetricsFilter, SheetEvent};
pub use session::{SessionGuard, SessionSnapshot};
