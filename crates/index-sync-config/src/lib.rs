//! Configuration, record types and snapshot cache for index-sync.

pub mod config;
pub mod persistence;
pub mod types;

pub use config::{
    CacheConfig, ClientOptions, ConfigError, Credentials, QueryConfig, ReplicaUpdateMode,
    SourceConfig, SyncConfig,
};
pub use persistence::{objects_key, FileCache, MemoryCache, ObjectCache};
pub use types::{FieldPath, IndexSettings, ObjectId, ObjectRecord, ObjectSnapshot};
