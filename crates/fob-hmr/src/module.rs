use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Numeric module identifier assigned by the resolver.
///
/// Ids are stable for the lifetime of a session but may change across full
/// rebuilds, so they are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u32);

impl ModuleId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ModuleId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// How a module participates in dependency discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleKind {
    /// JavaScript-like source that can import other modules.
    Source,
    /// JSON data module. Tracked but never has dependencies.
    Json,
    /// Static asset (image, font, ...). Tracked but never diffed.
    Asset,
}

/// A single source unit identified by its absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub path: PathBuf,
    pub kind: ModuleKind,
}

impl Module {
    pub fn new(id: impl Into<ModuleId>, path: impl Into<PathBuf>, kind: ModuleKind) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            kind,
        }
    }

    /// Shorthand for a plain source module.
    pub fn source(id: impl Into<ModuleId>, path: impl Into<PathBuf>) -> Self {
        Self::new(id, path, ModuleKind::Source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_asset(&self) -> bool {
        self.kind == ModuleKind::Asset
    }

    pub fn is_json(&self) -> bool {
        self.kind == ModuleKind::Json
    }

    /// Whether the resolver should be asked for this module's imports.
    ///
    /// Assets and JSON modules are leaves: they appear in the graph but
    /// contribute no further dependencies.
    pub fn has_dependencies(&self) -> bool {
        self.kind == ModuleKind::Source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_kind_flags() {
        let js = Module::source(1, "/app/index.js");
        assert!(js.has_dependencies());
        assert!(!js.is_asset());
        assert!(!js.is_json());

        let json = Module::new(2, "/app/data.json", ModuleKind::Json);
        assert!(json.is_json());
        assert!(!json.has_dependencies());

        let png = Module::new(3, "/app/logo.png", ModuleKind::Asset);
        assert!(png.is_asset());
        assert!(!png.has_dependencies());
    }

    #[test]
    fn test_module_id_serializes_as_number() {
        let json = serde_json::to_string(&ModuleId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!(ModuleId(7).to_string(), "7");
    }
}
