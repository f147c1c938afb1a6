//! Spreadsheet-driven API test sequences.
//!
//! Test cases are rows of a workbook. Rows linked through `use_next` form
//! sequences; each step may reference the two previous responses and the
//! config table, is sent over HTTP and is checked with soft assertions that
//! settle into one verdict per step.

pub mod binder;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod path;
pub mod runner;
pub mod sequence;
pub mod table;
pub mod validator;

pub use binder::{ExecutionWindow, PayloadBinder};
pub use checkpoint::CheckpointLedger;
pub use config::*;
pub use error::{EngineError, EngineResult, TransportError};
pub use http::{HttpClient, OutboundRequest, ReqwestClient};
pub use model::*;
pub use path::resolve_path;
pub use runner::*;
pub use sequence::{group_sequences, resolve_sequences};
pub use table::{ConfigTable, TestTable, Workbook};
pub use validator::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Group a workbook's rows into executable sequences.
///
/// Returns the sequences in discovery order together with the config table
/// their placeholders bind against.
pub fn prepare_workbook(
    workbook: Workbook,
) -> EngineResult<(Vec<Sequence>, ConfigTable)> {
    let (table, config) = workbook.into_tables()?;
    let groups = group_sequences(&table);
    let sequences = resolve_sequences(&table, &groups)?;
    Ok((sequences, config))
}
