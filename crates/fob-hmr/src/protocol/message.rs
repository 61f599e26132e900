//! Wire messages sent to HMR clients.
//!
//! One JSON object per message, discriminated by `type`:
//!
//! ```text
//! {"type":"update-start"}
//! {"type":"update","body":{"modules":[{"id":3,"code":"..."}],"inverseDependencies":{...},"sourceURLs":[...],"sourceMappingURLs":[...]}}
//! {"type":"update-done"}
//! {"type":"error","body":{"type":"TransformError","description":"...","filename":"...","lineNumber":3}}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::HmrError;
use crate::graph::InverseDependencyMap;
use crate::module::ModuleId;
use crate::resolver::Bundle;

/// Description sent in place of internal error details.
pub const INTERNAL_ERROR_DESCRIPTION: &str =
    "Unexpected server error while building the update; see the server log for details.";

/// Outbound message envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "kebab-case")]
pub enum ServerMessage {
    UpdateStart,
    Update(UpdatePayload),
    UpdateDone,
    Error(ErrorBody),
}

impl ServerMessage {
    /// Serialize to the JSON text frame sent over the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::UpdateStart => "update-start",
            ServerMessage::Update(_) => "update",
            ServerMessage::UpdateDone => "update-done",
            ServerMessage::Error(_) => "error",
        }
    }
}

/// One module of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateModule {
    pub id: ModuleId,
    pub code: String,
}

/// Body of an `update` message. Built fresh for every push.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    pub modules: Vec<UpdateModule>,
    pub inverse_dependencies: InverseDependencyMap,
    #[serde(rename = "sourceURLs")]
    pub source_urls: Vec<String>,
    #[serde(rename = "sourceMappingURLs")]
    pub source_mapping_urls: Vec<String>,
    /// Ids of deleted modules the client should drop.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted_modules: Vec<ModuleId>,
}

impl UpdatePayload {
    pub fn from_bundle(bundle: Bundle, inverse_dependencies: InverseDependencyMap) -> Self {
        let mut modules = Vec::with_capacity(bundle.modules.len());
        let mut source_urls = Vec::with_capacity(bundle.modules.len());
        let mut source_mapping_urls = Vec::with_capacity(bundle.modules.len());

        for module in bundle.modules {
            modules.push(UpdateModule {
                id: module.id,
                code: module.code,
            });
            source_urls.push(module.source_url);
            source_mapping_urls.push(module.source_mapping_url);
        }

        Self {
            modules,
            inverse_dependencies,
            source_urls,
            source_mapping_urls,
            deleted_modules: Vec::new(),
        }
    }

    /// Payload telling the client to forget a deleted module. Carries no code.
    pub fn deletion(id: ModuleId, inverse_dependencies: InverseDependencyMap) -> Self {
        Self {
            modules: Vec::new(),
            inverse_dependencies,
            source_urls: Vec::new(),
            source_mapping_urls: Vec::new(),
            deleted_modules: vec![id],
        }
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.iter().map(|m| m.id).collect()
    }
}

/// Error category reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    TransformError,
    NotFoundError,
    UnableToResolveError,
    InternalError,
}

/// Body of an `error` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

impl ErrorBody {
    /// Classify an error for the client.
    ///
    /// Internal errors are logged here and replaced by a generic description;
    /// their message never leaves the server.
    pub fn from_error(error: &HmrError) -> Self {
        match error {
            HmrError::NotFound { path } => Self {
                kind: ErrorKind::NotFoundError,
                description: error.to_string(),
                filename: Some(path.display().to_string()),
                line_number: None,
            },
            HmrError::SessionInvalid { entry_file } => Self {
                kind: ErrorKind::NotFoundError,
                description: error.to_string(),
                filename: Some(entry_file.display().to_string()),
                line_number: None,
            },
            HmrError::UnableToResolve { from, .. } => Self {
                kind: ErrorKind::UnableToResolveError,
                description: error.to_string(),
                filename: Some(from.display().to_string()),
                line_number: None,
            },
            HmrError::Transform {
                filename,
                description,
                line_number,
            } => Self {
                kind: ErrorKind::TransformError,
                description: description.clone(),
                filename: Some(filename.display().to_string()),
                line_number: *line_number,
            },
            HmrError::Internal(message) => {
                tracing::error!(error = %message, "Internal error while building HMR update");
                Self {
                    kind: ErrorKind::InternalError,
                    description: INTERNAL_ERROR_DESCRIPTION.to_string(),
                    filename: None,
                    line_number: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::BundledModule;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_unit_messages() {
        assert_eq!(
            ServerMessage::UpdateStart.to_json().unwrap(),
            r#"{"type":"update-start"}"#
        );
        assert_eq!(
            ServerMessage::UpdateDone.to_json().unwrap(),
            r#"{"type":"update-done"}"#
        );
    }

    #[test]
    fn test_update_envelope() {
        let bundle = Bundle {
            modules: vec![BundledModule {
                id: ModuleId(3),
                code: "__d(function(){}, 3);".to_string(),
                source_url: "http://localhost:8081/a.bundle".to_string(),
                source_mapping_url: "http://localhost:8081/a.map".to_string(),
            }],
        };
        let payload = UpdatePayload::from_bundle(bundle, InverseDependencyMap::default());
        let value = serde_json::to_value(ServerMessage::Update(payload)).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "update",
                "body": {
                    "modules": [{"id": 3, "code": "__d(function(){}, 3);"}],
                    "inverseDependencies": {},
                    "sourceURLs": ["http://localhost:8081/a.bundle"],
                    "sourceMappingURLs": ["http://localhost:8081/a.map"]
                }
            })
        );
    }

    #[test]
    fn test_deletion_payload_has_no_code() {
        let payload = UpdatePayload::deletion(ModuleId(4), InverseDependencyMap::default());
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["modules"], json!([]));
        assert_eq!(value["deletedModules"], json!([4]));
    }

    #[test]
    fn test_transform_error_body() {
        let err = HmrError::Transform {
            filename: PathBuf::from("/app/a.js"),
            description: "Unexpected token".to_string(),
            line_number: Some(12),
        };
        let value = serde_json::to_value(ServerMessage::Error(ErrorBody::from_error(&err))).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "error",
                "body": {
                    "type": "TransformError",
                    "description": "Unexpected token",
                    "filename": "/app/a.js",
                    "lineNumber": 12
                }
            })
        );
    }

    #[test]
    fn test_internal_error_is_redacted() {
        let err = HmrError::Internal("stack trace at /secret/path.rs:42".to_string());
        let body = ErrorBody::from_error(&err);
        assert_eq!(body.kind, ErrorKind::InternalError);
        assert_eq!(body.description, INTERNAL_ERROR_DESCRIPTION);
        assert!(body.filename.is_none());
    }

    #[test]
    fn test_resolution_errors() {
        let not_found = ErrorBody::from_error(&HmrError::NotFound {
            path: PathBuf::from("/app/gone.js"),
        });
        assert_eq!(not_found.kind, ErrorKind::NotFoundError);

        let unresolved = ErrorBody::from_error(&HmrError::UnableToResolve {
            specifier: "./c".to_string(),
            from: PathBuf::from("/app/a.js"),
            reason: "missing".to_string(),
        });
        assert_eq!(unresolved.kind, ErrorKind::UnableToResolveError);
        assert_eq!(unresolved.filename.as_deref(), Some("/app/a.js"));
    }
}
