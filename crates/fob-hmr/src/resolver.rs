//! Resolver/transformer collaborator.
//!
//! The HMR service never resolves specifiers or transforms code itself. It
//! orchestrates calls to a [`Resolver`] and diffs the outputs. Platform
//! bindings (the native CLI adapter, test doubles) implement this trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::module::{Module, ModuleId};

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Errors reported by a resolver implementation
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolverError {
    /// A file that should exist could not be found
    #[error("File not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// A specifier could not be resolved to a file
    #[error("Unable to resolve module '{specifier}' from '{}': {reason}", .from.display())]
    UnableToResolve {
        specifier: String,
        from: PathBuf,
        reason: String,
    },

    /// The source failed to parse or transform
    #[error("Transform error in {}: {message}", .filename.display())]
    Transform {
        filename: PathBuf,
        message: String,
        line_number: Option<u32>,
    },

    /// Anything else (I/O, internal invariants, ...)
    #[error("{0}")]
    Other(String),
}

/// Options passed to every resolver call made by the HMR service.
///
/// `hot` and `minify` are fixed in this mode, so the only way to build the
/// options is [`ResolveOptions::hot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    pub platform: String,
    /// File whose dependencies are requested.
    pub entry_file: PathBuf,
    /// Entry file of the session on whose behalf the call is made.
    pub root_entry_file: PathBuf,
    pub hot: bool,
    pub minify: bool,
}

impl ResolveOptions {
    pub fn hot(
        platform: impl Into<String>,
        entry_file: impl Into<PathBuf>,
        root_entry_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            platform: platform.into(),
            entry_file: entry_file.into(),
            root_entry_file: root_entry_file.into(),
            hot: true,
            minify: false,
        }
    }
}

/// Minimal resolution context handed to the transformer so that `require`
/// calls between the modules of one update resolve to the right ids.
#[derive(Debug, Clone, Default)]
pub struct ResolutionResponse {
    /// Every module known to the session, in graph order.
    pub modules: Vec<Module>,
    /// Direct dependencies per module path, in import order.
    pub dependencies: Vec<(PathBuf, Vec<PathBuf>)>,
}

impl ResolutionResponse {
    /// Look up the id of a module known to the session.
    pub fn id_for(&self, path: &Path) -> Option<ModuleId> {
        self.modules.iter().find(|m| m.path == path).map(|m| m.id)
    }
}

/// Input to [`Resolver::build_bundle_for_hmr`].
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub resolve: ResolveOptions,
    /// Exactly the modules to transform, in delivery order.
    pub modules: Vec<Module>,
    pub resolution_response: ResolutionResponse,
}

/// One transformed module of an HMR bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundledModule {
    pub id: ModuleId,
    pub code: String,
    pub source_url: String,
    pub source_mapping_url: String,
}

/// Output of [`Resolver::build_bundle_for_hmr`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    pub modules: Vec<BundledModule>,
}

impl Bundle {
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// External resolver/transformer used by the HMR service.
#[async_trait]
pub trait Resolver: Send + Sync + std::fmt::Debug {
    /// Direct dependencies of `options.entry_file`, resolved to absolute paths,
    /// in import order.
    async fn get_shallow_dependencies(
        &self,
        options: &ResolveOptions,
    ) -> ResolverResult<Vec<PathBuf>>;

    /// Module metadata (id, kind) for a path.
    async fn get_module_for_path(&self, path: &Path) -> ResolverResult<Module>;

    /// Transform exactly `options.modules` into ready-to-run HMR code.
    async fn build_bundle_for_hmr(
        &self,
        options: &BundleOptions,
        host: &str,
        port: u16,
    ) -> ResolverResult<Bundle>;
}
