pub mod archive;
pub mod audit;
pub mod code;
pub mod config;
pub mod error;
pub mod load;
pub mod resolve;
pub mod store;
pub mod unpivot;

pub use config::LoadConfig;
pub use error::{LoadError, Result};
pub use load::{ArchiveDirectory, Orchestrator, SourceCatalog, StagedTables, YearSummary};
pub use store::{DuckStore, Store};
