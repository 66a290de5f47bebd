//! Index reconciliation engine.
//!
//! Keeps remote search indices in line with the results of declarative
//! queries, writing only what changed and never leaving an index half
//! rebuilt.

pub mod error;
pub mod reporter;
pub mod search;
pub mod source;
pub mod sync;
pub mod test_utils;

pub use error::{Result, SyncError};
pub use reporter::{Activity, Reporter, TracingReporter};
pub use search::{AlgoliaClient, MemorySearchService, SearchError, SearchService};
pub use source::{GraphqlClient, PointerTransformer, QueryExecutor, QueryResponse, Transformer};
pub use sync::{preflight, QueryDescriptor, RunDecision, RunOptions, RunReport, RunStatus, SyncRunner};
