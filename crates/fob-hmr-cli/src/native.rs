//! Native [`Resolver`] backed by the local file system.
//!
//! Every source file is parsed with `oxc_parser`. Dependencies are read off
//! the parsed program (`import`/`export ... from` declarations, `require('...')`
//! calls and dynamic `import('...')`), so comments and string contents never
//! count as imports. Specifiers are resolved with `oxc_resolver`. A broken
//! edit surfaces as a transform error with a line number instead of a
//! half-applied update.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use fob_hmr::{
    Bundle, BundleOptions, BundledModule, Module, ModuleId, ModuleKind, ResolutionResponse,
    ResolveOptions, Resolver, ResolverError, ResolverResult,
};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, ExportAllDeclaration, ExportNamedDeclaration, Expression,
    ImportDeclaration, ImportExpression,
};
use oxc_ast_visit::{Visit, walk};
use oxc_parser::{Parser, ParserReturn};
use oxc_span::{SourceType, Span};

/// Extensions served as static assets rather than code.
const ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "ttf", "otf", "woff", "woff2", "mp3",
    "mp4", "wav", "webm",
];

/// How a module refers to one of its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// `import ... from '...'`, `import '...'` or `export ... from '...'`
    Static,
    /// `require('...')`
    Require,
    /// `import('...')`
    Dynamic,
}

/// One dependency reference found in a parsed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRecord {
    pub specifier: String,
    pub kind: ImportKind,
    /// Span of the specifier string literal, quotes included.
    pub span: Span,
}

/// Dependency references of a module, in source order.
#[derive(Debug, Default)]
pub struct ModuleScan {
    pub imports: Vec<ImportRecord>,
}

impl ModuleScan {
    /// Distinct specifiers in order of first appearance.
    pub fn specifiers(&self) -> Vec<String> {
        let mut specifiers: Vec<String> = Vec::with_capacity(self.imports.len());
        for record in &self.imports {
            if !specifiers.iter().any(|existing| *existing == record.specifier) {
                specifiers.push(record.specifier.clone());
            }
        }
        specifiers
    }

    pub fn requires(&self) -> impl Iterator<Item = &ImportRecord> {
        self.imports
            .iter()
            .filter(|record| record.kind == ImportKind::Require)
    }
}

#[derive(Default)]
struct ImportCollector {
    imports: Vec<ImportRecord>,
}

impl ImportCollector {
    fn push(&mut self, specifier: &str, kind: ImportKind, span: Span) {
        self.imports.push(ImportRecord {
            specifier: specifier.to_string(),
            kind,
            span,
        });
    }
}

impl<'ast> Visit<'ast> for ImportCollector {
    fn visit_import_declaration(&mut self, import: &ImportDeclaration<'ast>) {
        if !import.import_kind.is_type() {
            self.push(
                import.source.value.as_str(),
                ImportKind::Static,
                import.source.span,
            );
        }
    }

    fn visit_export_named_declaration(&mut self, export: &ExportNamedDeclaration<'ast>) {
        if let Some(source) = &export.source {
            if !export.export_kind.is_type() {
                self.push(source.value.as_str(), ImportKind::Static, source.span);
            }
        }
        // `export const x = require('./x')` still carries a require.
        walk::walk_export_named_declaration(self, export);
    }

    fn visit_export_all_declaration(&mut self, export: &ExportAllDeclaration<'ast>) {
        if !export.export_kind.is_type() {
            self.push(
                export.source.value.as_str(),
                ImportKind::Static,
                export.source.span,
            );
        }
    }

    fn visit_import_expression(&mut self, expr: &ImportExpression<'ast>) {
        if let Expression::StringLiteral(lit) = &expr.source {
            self.push(lit.value.as_str(), ImportKind::Dynamic, lit.span);
        }
        walk::walk_import_expression(self, expr);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'ast>) {
        if let Expression::Identifier(ident) = &call.callee {
            if ident.name.as_str() == "require" && call.arguments.len() == 1 {
                if let Argument::StringLiteral(lit) = &call.arguments[0] {
                    self.push(lit.value.as_str(), ImportKind::Require, lit.span);
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}

/// Resolver over the project directory.
pub struct NativeResolver {
    root: PathBuf,
    resolver: oxc_resolver::Resolver,
    ids: DashMap<PathBuf, ModuleId>,
    next_id: AtomicU32,
}

impl NativeResolver {
    pub fn new(root: PathBuf, extensions: Vec<String>) -> Self {
        let resolver = oxc_resolver::Resolver::new(oxc_resolver::ResolveOptions {
            condition_names: vec![
                "react-native".into(),
                "browser".into(),
                "import".into(),
                "require".into(),
                "default".into(),
            ],
            extensions,
            builtin_modules: true,
            ..Default::default()
        });

        Self {
            root,
            resolver,
            ids: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stable id for `path`, allocated on first sight.
    pub fn module_id(&self, path: &Path) -> ModuleId {
        *self
            .ids
            .entry(path.to_path_buf())
            .or_insert_with(|| ModuleId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn kind_for(path: &Path) -> ModuleKind {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ModuleKind::Json,
            Some(ext) if ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
                ModuleKind::Asset
            }
            _ => ModuleKind::Source,
        }
    }

    async fn read_source(path: &Path) -> ResolverResult<String> {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ResolverError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ResolverError::Other(format!("Failed to read {}: {}", path.display(), e))
            }
        })
    }

    /// Resolve `specifier` as imported from `from`. `Ok(None)` for built-in
    /// and explicitly ignored modules, which never enter the graph.
    fn resolve_specifier(&self, specifier: &str, from: &Path) -> ResolverResult<Option<PathBuf>> {
        let from_dir = from.parent().unwrap_or(&self.root);
        match self.resolver.resolve(from_dir, specifier) {
            Ok(resolution) => Ok(Some(resolution.path().to_path_buf())),
            Err(oxc_resolver::ResolveError::Builtin { .. })
            | Err(oxc_resolver::ResolveError::Ignored(_)) => Ok(None),
            Err(e) => Err(ResolverError::UnableToResolve {
                specifier: specifier.to_string(),
                from: from.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    fn url_for(&self, path: &Path, host: &str, port: u16, platform: &str, map: bool) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut relative = relative.to_string_lossy().replace('\\', "/");
        if map {
            relative.push_str(".map");
        }
        format!(
            "http://{host}:{port}/{}?platform={platform}&dev=true&hot=true",
            relative.trim_start_matches('/')
        )
    }

    fn transform(
        &self,
        module: &Module,
        source: &str,
        response: &ResolutionResponse,
        options: &ResolveOptions,
        host: &str,
        port: u16,
    ) -> ResolverResult<String> {
        let body = match module.kind {
            ModuleKind::Asset => {
                let uri = self.url_for(&module.path, host, port, &options.platform, false);
                format!(
                    "module.exports = {};",
                    serde_json::json!({ "__packager_asset": true, "uri": uri })
                )
            }
            ModuleKind::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(source).map_err(|e| ResolverError::Transform {
                        filename: module.path.clone(),
                        message: e.to_string(),
                        line_number: u32::try_from(e.line()).ok(),
                    })?;
                format!("module.exports = {value};")
            }
            ModuleKind::Source => {
                let scan = scan_module(&module.path, source)?;
                self.rewrite_requires(&module.path, source, &scan, response)?
            }
        };

        Ok(format!(
            "__d(function(global, require, module, exports) {{\n{body}\n}}, {});",
            module.id
        ))
    }

    /// Replace the specifier literal of every `require('./dep')` call with the
    /// dependency's module id, giving `require(<id>)`.
    fn rewrite_requires(
        &self,
        path: &Path,
        source: &str,
        scan: &ModuleScan,
        response: &ResolutionResponse,
    ) -> ResolverResult<String> {
        let mut out = String::with_capacity(source.len());
        let mut last = 0;

        for record in scan.requires() {
            let Some(resolved) = self.resolve_specifier(&record.specifier, path)? else {
                continue;
            };
            let id = response
                .id_for(&resolved)
                .unwrap_or_else(|| self.module_id(&resolved));

            let (start, end) = (record.span.start as usize, record.span.end as usize);
            out.push_str(&source[last..start]);
            out.push_str(&id.to_string());
            last = end;
        }

        out.push_str(&source[last..]);
        Ok(out)
    }
}

/// Parse `source` and collect its dependency references. The first syntax
/// error is reported with its line.
pub fn scan_module(path: &Path, source: &str) -> ResolverResult<ModuleScan> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());
    let ParserReturn {
        program, errors, ..
    } = Parser::new(&allocator, source, source_type).parse();

    if let Some(error) = errors.first() {
        let line_number = error
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| line_of(source, label.offset()));

        return Err(ResolverError::Transform {
            filename: path.to_path_buf(),
            message: error.message.to_string(),
            line_number,
        });
    }

    let mut collector = ImportCollector::default();
    walk::walk_program(&mut collector, &program);
    collector.imports.sort_by_key(|record| record.span.start);

    Ok(ModuleScan {
        imports: collector.imports,
    })
}

fn line_of(source: &str, offset: usize) -> u32 {
    let end = offset.min(source.len());
    let newlines = source.as_bytes()[..end].iter().filter(|b| **b == b'\n').count();
    u32::try_from(newlines + 1).unwrap_or(u32::MAX)
}

#[async_trait]
impl Resolver for NativeResolver {
    async fn get_shallow_dependencies(
        &self,
        options: &ResolveOptions,
    ) -> ResolverResult<Vec<PathBuf>> {
        let path = &options.entry_file;
        if Self::kind_for(path) != ModuleKind::Source {
            return Ok(Vec::new());
        }

        let source = Self::read_source(path).await?;
        let scan = scan_module(path, &source)?;

        // Files may have appeared or vanished since the last lookup.
        self.resolver.clear_cache();

        let mut dependencies = Vec::new();
        for specifier in scan.specifiers() {
            if let Some(resolved) = self.resolve_specifier(&specifier, path)? {
                if !dependencies.contains(&resolved) {
                    dependencies.push(resolved);
                }
            }
        }
        Ok(dependencies)
    }

    async fn get_module_for_path(&self, path: &Path) -> ResolverResult<Module> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => {
                Ok(Module::new(self.module_id(path), path, Self::kind_for(path)))
            }
            _ => Err(ResolverError::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }

    async fn build_bundle_for_hmr(
        &self,
        options: &BundleOptions,
        host: &str,
        port: u16,
    ) -> ResolverResult<Bundle> {
        let mut modules = Vec::with_capacity(options.modules.len());

        for module in &options.modules {
            let source = if module.is_asset() {
                String::new()
            } else {
                Self::read_source(&module.path).await?
            };
            let code = self.transform(
                module,
                &source,
                &options.resolution_response,
                &options.resolve,
                host,
                port,
            )?;

            modules.push(BundledModule {
                id: module.id,
                code,
                source_url: self.url_for(&module.path, host, port, &options.resolve.platform, false),
                source_mapping_url: self.url_for(
                    &module.path,
                    host,
                    port,
                    &options.resolve.platform,
                    true,
                ),
            });
        }

        Ok(Bundle { modules })
    }
}

impl std::fmt::Debug for NativeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeResolver")
            .field("root", &self.root)
            .field("known_modules", &self.ids.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specifiers(source: &str) -> Vec<String> {
        scan_module(Path::new("/a/index.ts"), source)
            .unwrap()
            .specifiers()
    }

    #[test]
    fn test_specifiers_in_order() {
        let source = r#"
import React from 'react';
import { a, b } from "./a";
import './side-effect.css';
// import nope from './commented';
/* require('./also-commented') */
import type { T } from './types';
export { c } from './c';
export * from './d';
const e = require('./e');
const f = await import('./f');
const again = require('./a');
"#;
        assert_eq!(
            specifiers(source),
            vec!["react", "./a", "./side-effect.css", "./c", "./d", "./e", "./f"]
        );
    }

    #[test]
    fn test_multiline_import_clause() {
        let source = "import {\n  one,\n  two,\n} from './multi';\n";
        assert_eq!(specifiers(source), vec!["./multi"]);
    }

    #[test]
    fn test_comments_and_strings_are_not_imports() {
        let source = "foo(); // require('./gone')\n\
                      const s = \"import x from './nope'\";\n\
                      const url = 'http://x/*'; require('./real'); const t = '*/';\n";
        assert_eq!(specifiers(source), vec!["./real"]);
    }

    #[test]
    fn test_require_inside_export_declaration() {
        let source = "export const x = require('./x');\nexport type { T } from './types';\n";
        assert_eq!(specifiers(source), vec!["./x"]);
    }

    #[test]
    fn test_require_spans_cover_literal() {
        let source = "const a = require('./a');";
        let scan = scan_module(Path::new("/a/index.js"), source).unwrap();
        let record = scan.requires().next().unwrap();
        assert_eq!(record.kind, ImportKind::Require);
        assert_eq!(
            &source[record.span.start as usize..record.span.end as usize],
            "'./a'"
        );
    }

    #[test]
    fn test_non_literal_require_is_skipped() {
        let source = "const name = './a';\nconst a = require(name);\nconst b = import(name);\n";
        assert!(specifiers(source).is_empty());
    }

    #[test]
    fn test_kind_for() {
        assert_eq!(NativeResolver::kind_for(Path::new("/a/data.json")), ModuleKind::Json);
        assert_eq!(NativeResolver::kind_for(Path::new("/a/logo.PNG")), ModuleKind::Asset);
        assert_eq!(NativeResolver::kind_for(Path::new("/a/index.tsx")), ModuleKind::Source);
    }

    #[test]
    fn test_syntax_error_line() {
        let err = scan_module(Path::new("/a/index.js"), "const a = 1;\nconst = ;\n").unwrap_err();
        let ResolverError::Transform { line_number, .. } = err else {
            panic!("expected transform error");
        };
        assert_eq!(line_number, Some(2));
    }

    #[test]
    fn test_valid_syntax() {
        assert!(scan_module(Path::new("/a/index.js"), "export const a = () => 1;").is_ok());
    }

    #[test]
    fn test_ids_are_stable() {
        let resolver = NativeResolver::new(PathBuf::from("/project"), vec![".js".into()]);
        let a = resolver.module_id(Path::new("/project/a.js"));
        let b = resolver.module_id(Path::new("/project/b.js"));
        assert_ne!(a, b);
        assert_eq!(resolver.module_id(Path::new("/project/a.js")), a);
    }

    #[test]
    fn test_url_for() {
        let resolver = NativeResolver::new(PathBuf::from("/project"), vec![".js".into()]);
        assert_eq!(
            resolver.url_for(Path::new("/project/src/a.js"), "localhost", 8081, "ios", false),
            "http://localhost:8081/src/a.js?platform=ios&dev=true&hot=true"
        );
        assert!(
            resolver
                .url_for(Path::new("/project/src/a.js"), "localhost", 8081, "ios", true)
                .contains("/src/a.js.map?")
        );
    }
}
