//! Incremental bundle builder.
//!
//! Turns the modules selected by the change reactor into an update payload by
//! delegating to the resolver's HMR transform. Operates only on the inputs it
//! is given and never touches shared bundler state.

use std::sync::Arc;

use crate::config::HmrConfig;
use crate::error::Result;
use crate::module::Module;
use crate::protocol::UpdatePayload;
use crate::resolver::{BundleOptions, ResolveOptions, Resolver};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct IncrementalBundleBuilder {
    resolver: Arc<dyn Resolver>,
    config: HmrConfig,
}

impl IncrementalBundleBuilder {
    pub fn new(resolver: Arc<dyn Resolver>, config: HmrConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &HmrConfig {
        &self.config
    }

    /// Build code for exactly `modules`, in the given order.
    ///
    /// Returns `Ok(None)` when none of the modules is reachable from the
    /// session's entry file, or the transformer produced nothing. Callers
    /// treat that as a no-op, not a failure.
    pub async fn build_for(
        &self,
        session: &Session,
        modules: &[Module],
    ) -> Result<Option<UpdatePayload>> {
        let graph = session.graph();
        let reachable: Vec<Module> = modules
            .iter()
            .filter(|module| graph.contains_path(&module.path))
            .cloned()
            .collect();

        if reachable.is_empty() {
            tracing::debug!(
                connection_id = %session.connection_id(),
                requested = modules.len(),
                "No reachable modules to bundle"
            );
            return Ok(None);
        }

        let options = BundleOptions {
            resolve: ResolveOptions::hot(
                session.platform(),
                session.entry_file(),
                session.entry_file(),
            ),
            modules: reachable,
            resolution_response: session.resolution_response(),
        };

        let bundle = self
            .resolver
            .build_bundle_for_hmr(&options, self.config.public_host(), self.config.port)
            .await?;

        if bundle.is_empty() {
            return Ok(None);
        }

        Ok(Some(UpdatePayload::from_bundle(
            bundle,
            graph.inverse_dependencies().clone(),
        )))
    }
}
