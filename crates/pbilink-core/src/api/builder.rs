//! Builder for constructing a [`PbiCore`] instance.

use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::discovery::DiscoveryOptions;
use crate::remote::ModelServer;
use crate::system::{Introspector, ProcfsIntrospector};

use super::core::PbiCore;

/// Builder for constructing a [`PbiCore`] Facade instance
pub struct PbiCoreBuilder {
    server: Arc<dyn ModelServer>,
    introspector: Option<Arc<dyn Introspector>>,
    options: DiscoveryOptions,
    diagnostics: bool,
}

impl PbiCoreBuilder {
    /// Create a new builder around the given model server
    pub fn new(server: Arc<dyn ModelServer>) -> Self {
        Self {
            server,
            introspector: None,
            options: DiscoveryOptions::default(),
            diagnostics: false,
        }
    }

    /// Use a specific introspector instead of reading `/proc`
    pub fn with_introspector(mut self, introspector: Arc<dyn Introspector>) -> Self {
        self.introspector = Some(introspector);
        self
    }

    /// Set the discovery options
    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Start with diagnostics recording on or off
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Build the `PbiCore` instance
    ///
    /// If no introspector was provided, a [`ProcfsIntrospector`] is used.
    pub fn build(self) -> PbiCore {
        let introspector = self
            .introspector
            .unwrap_or_else(|| Arc::new(ProcfsIntrospector::new()));

        PbiCore::new(
            introspector,
            self.options,
            Diagnostics::new(self.diagnostics),
            self.server,
        )
    }
}
