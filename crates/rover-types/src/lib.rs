//! Identity and taxonomy types for the rover robot runtime.
//!
//! This crate is the shared vocabulary of the workspace:
//!
//! - [`Api`]: the `(namespace, kind, subtype)` triple identifying a
//!   resource contract
//! - [`ResourceName`]: canonical resource identity with the remote-prefix
//!   algebra
//! - [`Model`]: driver implementation identifier, with the reserved
//!   `builtin` and `unknown` models
//! - [`ErrorCode`]: the workspace-wide machine-readable error contract
//!
//! It carries no runtime behavior; the dependency graph lives in
//! `rover-resource` and the manager in `rover-runtime`.

pub mod api;
pub mod error;
pub mod model;
pub mod name;

pub use api::{Api, ApiKind, ApiNamespace, ApiParseError};
pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use model::{Model, DEFAULT_MODEL_FAMILY};
pub use name::{NameParseError, ResourceName};
