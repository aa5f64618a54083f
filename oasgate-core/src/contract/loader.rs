//! Contract file discovery and parsing.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ContractDocument, ContractError, SpecVersion};

/// Environment variable naming the contract file.
pub const CONTRACT_ENV: &str = "OASGATE_CONTRACT";

/// Contract search paths, in priority order.
pub fn default_contract_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(path) = std::env::var(CONTRACT_ENV) {
        paths.push(PathBuf::from(path));
    }

    paths.push(PathBuf::from("/etc/openapi/openapi.json"));
    paths.push(PathBuf::from("/etc/openapi/openapi.yaml"));
    paths.push(PathBuf::from("./openapi.json"));
    paths.push(PathBuf::from("./openapi.yaml"));

    paths
}

/// Finds the contract file.
///
/// An explicit path is authoritative: if it does not exist, the default
/// locations are not searched.
pub fn find_contract_file(explicit_path: Option<&Path>) -> Result<PathBuf, ContractError> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ContractError::ContractFileNotFound {
            searched: vec![path.to_path_buf()],
        });
    }

    let paths = default_contract_paths();
    for path in &paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    Err(ContractError::ContractFileNotFound { searched: paths })
}

/// Reads the raw contract bytes.
pub fn read_contract(path: &Path) -> Result<Vec<u8>, ContractError> {
    let bytes = std::fs::read(path)?;
    info!(path = %path.display(), size = bytes.len(), "Read contract file");
    Ok(bytes)
}

/// Parses a contract and checks its document-level shape.
///
/// JSON is assumed when the first non-whitespace byte is `{`, YAML otherwise.
pub fn load_contract(bytes: &[u8]) -> Result<ContractDocument, ContractError> {
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    let Some(first) = first else {
        return Err(ContractError::EmptyContract);
    };

    let root: Value = if *first == b'{' {
        serde_json::from_slice(bytes).map_err(|e| ContractError::Parse {
            format: "JSON",
            message: e.to_string(),
        })?
    } else {
        let text = std::str::from_utf8(bytes).map_err(|e| ContractError::Parse {
            format: "YAML",
            message: e.to_string(),
        })?;
        serde_saphyr::from_str(text).map_err(|e| ContractError::Parse {
            format: "YAML",
            message: e.to_string(),
        })?
    };

    let declared_version = match root.get("openapi") {
        Some(Value::String(v)) => v.trim().to_string(),
        Some(other) => {
            return Err(ContractError::UnsupportedVersion {
                version: other.to_string(),
            });
        }
        None => return Err(ContractError::MissingVersion),
    };

    let version =
        SpecVersion::parse(&declared_version).ok_or_else(|| ContractError::UnsupportedVersion {
            version: declared_version.clone(),
        })?;

    if !root.get("paths").is_some_and(Value::is_object) {
        return Err(ContractError::MissingPaths);
    }

    debug!(version = %declared_version, "Contract document parsed");

    Ok(ContractDocument {
        root,
        version,
        declared_version,
    })
}
