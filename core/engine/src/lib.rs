//! FILENAME: core/engine/src/lib.rs
//! PURPOSE: Main library entry point for the review flows engine.
//! CONTEXT: Re-exports public types and modules for use by other crates.

pub mod compute;
pub mod config;
pub mod cursor;
pub mod error;
pub mod finalize;
pub mod flows;
pub mod frame;
pub mod functions;
pub mod group;
pub mod logging;
pub mod mapping;
pub mod source;
pub mod store;
pub mod tally;
pub mod value;
pub mod view;

// Re-export commonly used types at the crate root
pub use config::{
    ComputeSpec, ComputeTarget, Condition, Derivation, FieldDecl, FlowConfig, GroupDecl,
    IndexSpec, SortBy, TallySpec, ViewNode, ViewSpec,
};
pub use cursor::Cursor;
pub use error::{BoxError, EngineError, EngineResult};
pub use finalize::finalize;
pub use flows::Flows;
pub use frame::RawFrame;
pub use functions::{split_name, ComputeFn, FunctionEntry, FunctionRegistry, Kwargs};
pub use group::{CellWrite, Column, ColumnGroup, GroupKind};
pub use mapping::{is_valid_identifier, to_camel_case, MappingEntry, MappingRegistry};
pub use source::{GroupSource, MemorySource};
pub use store::LayeredStore;
pub use tally::{TallyWhich, TALLY_SEPARATOR};
pub use value::{ColumnType, Value};
pub use view::temp_name;
