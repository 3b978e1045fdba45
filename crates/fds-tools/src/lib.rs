//! Analytics tool catalog and invoker.
//!
//! Defines the fixed catalog of typed analytics operations advertised to the
//! language model, validates candidate argument sets against the catalog,
//! and dispatches validated calls to the external tool server over HTTP.

pub mod catalog;
pub mod error;
pub mod invoker;
pub mod types;
pub mod validate;

pub use catalog::Catalog;
pub use error::ToolError;
pub use invoker::{HttpToolInvoker, ToolInvoker};
pub use types::{FailureKind, Operation, ParamSpec, ParamType, ToolCall, ToolResult};
pub use validate::{validate, TENANT_PARAM};
