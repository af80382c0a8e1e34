pub mod cli;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod ingest;
pub mod parser;
pub mod report;
pub mod schema;
pub mod store;

pub use cli::{Cli, Commands};
pub use error::IngestError;
pub use ingest::{run_ingest, IngestOptions, IngestSummary};
pub use report::{Phase, Reporter, SilentReporter};
