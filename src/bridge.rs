//! JSON surface for JavaScript callers.
//!
//! The JS side owns evaluation and loading; it hands over files plus the
//! names of the dependencies it has already resolved, and receives compiled
//! modules (factory sources and export info) or a structured error.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::autodetect::detect_dependencies;
use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::model::{SourceBatch, SourceFile};
use crate::resolver::DependencyTable;
use crate::security::SecurityScanner;
use crate::transform::{compile_batch, TransformOutput};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    pub files: Vec<SourceFile>,
    /// Dependency specifiers (or `prefix/*` wildcards) the caller will bind.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub options: EngineOptions,
    #[serde(default)]
    pub bypass_security: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeError {
    pub code: String,
    pub message: String,
    pub forbidden_pattern_detected: bool,
}

impl From<&EngineError> for BridgeError {
    fn from(error: &EngineError) -> Self {
        BridgeError {
            code: error.code().to_string(),
            message: error.to_string(),
            forbidden_pattern_detected: error.is_policy_rejection(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub output: Option<TransformOutput>,
    pub error: Option<BridgeError>,
}

/// Scan (unless bypassed), analyze and transform. Errors come back inside
/// the response, never as a failure of the call.
pub fn transform_files(request: &TransformRequest) -> TransformResponse {
    let result = SecurityScanner::from_sources(&request.options.forbidden_patterns)
        .and_then(|scanner| {
            let batch = SourceBatch::new(request.files.clone());
            scanner.scan(&batch, request.bypass_security)?;
            let table = DependencyTable::from_specifiers(request.dependencies.iter().cloned());
            compile_batch(&batch, &request.options.framework_specifiers, &table)
        });
    match result {
        Ok(output) => TransformResponse {
            output: Some(output),
            error: None,
        },
        Err(error) => TransformResponse {
            output: None,
            error: Some(BridgeError::from(&error)),
        },
    }
}

pub fn transform_files_json(request_json: &str) -> Result<serde_json::Value, EngineError> {
    let request: TransformRequest = serde_json::from_str(request_json)
        .map_err(|e| EngineError::Config(format!("request parse error: {}", e)))?;
    serde_json::to_value(transform_files(&request))
        .map_err(|e| EngineError::Internal(e.to_string()))
}

/// Auto-detected specifier → URL map, without loading anything.
pub fn detect_dependencies_json(
    files_json: &str,
    options_json: &str,
) -> Result<BTreeMap<String, String>, EngineError> {
    let files: Vec<SourceFile> = serde_json::from_str(files_json)
        .map_err(|e| EngineError::Config(format!("files parse error: {}", e)))?;
    let options = EngineOptions::from_json(options_json)?;
    let batch = SourceBatch::new(files);
    Ok(detect_dependencies(&batch, &options, &HashSet::new())
        .into_iter()
        .map(|d| (d.specifier, d.url))
        .collect())
}

#[cfg(feature = "napi")]
#[napi]
pub fn transform_files_native(request_json: String) -> napi::Result<serde_json::Value> {
    transform_files_json(&request_json).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn detect_dependencies_native(
    files_json: String,
    options_json: String,
) -> napi::Result<serde_json::Value> {
    let detected = detect_dependencies_json(&files_json, &options_json)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(detected).map_err(|e| napi::Error::from_reason(e.to_string()))
}
