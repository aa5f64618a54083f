//! OpenAPI contract loading and the shipped validation engine.
//!
//! # Startup Flow
//!
//! 1. [`find_contract_file`] picks the contract path (explicit flag, then the
//!    `OASGATE_CONTRACT` env var, then the default locations).
//! 2. [`read_contract`] reads the raw bytes.
//! 3. [`load_contract`] parses JSON or YAML and checks the document is an
//!    OpenAPI 3.0 / 3.1 contract.
//! 4. [`build_queryable_model`] resolves references, compiles every schema,
//!    and returns the [`OpenApiValidator`] shared by all checks.
//!
//! Any failure here is fatal: the sidecar must not serve without a contract.

mod loader;
mod model;
mod params;
mod path;
mod schema;
mod validator;

use std::path::PathBuf;
use thiserror::Error;

pub use loader::{
    CONTRACT_ENV, default_contract_paths, find_contract_file, load_contract, read_contract,
};
pub use model::build_queryable_model;
pub use path::PathTemplate;
pub use validator::OpenApiValidator;

/// Contract loading and model-building errors.
#[derive(Debug, Error)]
pub enum ContractError {
    /// No contract file at any searched location.
    #[error("Contract file not found. Searched: {searched:?}")]
    ContractFileNotFound { searched: Vec<PathBuf> },

    /// I/O error reading the contract.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The contract file is empty or whitespace only.
    #[error("Contract file is empty")]
    EmptyContract,

    /// The document is not valid JSON / YAML.
    #[error("Failed to parse {format} contract: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    /// No `openapi` version field.
    #[error("Contract has no 'openapi' version field")]
    MissingVersion,

    /// The `openapi` version is not 3.0.x or 3.1.x.
    #[error("Unsupported OpenAPI version '{version}': expected 3.0.x or 3.1.x")]
    UnsupportedVersion { version: String },

    /// No `paths` object.
    #[error("Contract has no 'paths' object")]
    MissingPaths,

    /// A `$ref` that does not point inside the document.
    #[error("Unresolved reference '{reference}'")]
    UnresolvedRef { reference: String },

    /// An operation or parameter the engine cannot use.
    #[error("Invalid operation {method} {path}: {reason}")]
    InvalidOperation {
        path: String,
        method: String,
        reason: String,
    },

    /// A schema that does not compile.
    #[error("Invalid schema at {location}: {message}")]
    InvalidSchema { location: String, message: String },
}

/// OpenAPI major.minor line of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecVersion {
    /// 3.0.x: JSON Schema draft 4 dialect with `nullable`.
    V3_0,
    /// 3.1.x: JSON Schema 2020-12.
    V3_1,
}

impl SpecVersion {
    /// Parses an `openapi` field value.
    pub fn parse(version: &str) -> Option<Self> {
        let line = |prefix: &str| {
            version
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        };
        if line("3.0") {
            Some(Self::V3_0)
        } else if line("3.1") {
            Some(Self::V3_1)
        } else {
            None
        }
    }
}

/// A parsed contract that passed the document-level checks.
#[derive(Debug, Clone)]
pub struct ContractDocument {
    root: serde_json::Value,
    version: SpecVersion,
    declared_version: String,
}

impl ContractDocument {
    /// The whole document.
    pub fn root(&self) -> &serde_json::Value {
        &self.root
    }

    pub fn version(&self) -> SpecVersion {
        self.version
    }

    /// The `openapi` field as written.
    pub fn declared_version(&self) -> &str {
        &self.declared_version
    }
}
