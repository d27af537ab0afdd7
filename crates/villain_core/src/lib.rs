//! Core of the villain store.
//!
//! A single-table SQLite store exposed through a locator-addressed CRUD
//! provider with change notification.

pub mod db;
pub mod logging;
pub mod model;
pub mod provider;
pub mod repo;

pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::villain::{Villain, VillainId, VillainValidationError, VillainValues};
pub use provider::error::{ProviderError, ProviderResult};
pub use provider::notifier::{ChangeNotifier, SubscriptionHandle};
pub use provider::uri::{Locator, LocatorParseError, UriMatcher, UriMatcherError};
pub use provider::villain_provider::{
    ProviderConfig, VillainCursor, VillainProvider, VillainRoute,
};
pub use repo::villain_repo::{
    RepoError, RepoResult, SqliteVillainRepository, VillainColumn, VillainQuery,
    VillainRepository, VillainSort,
};
