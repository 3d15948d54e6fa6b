//! # Application State
//!
//! Shared, cheaply clonable handles injected into every handler: the
//! immutable configuration, the transition engine, the document assembler,
//! and the message catalog.

use std::sync::Arc;

use lsd_core::Clock;
use lsd_issuer_client::IssuerNotifier;
use lsd_state::{LinkBuilder, Localize, StatusDocumentAssembler};

use crate::config::AppConfig;
use crate::engine::LicenseEngine;
use crate::i18n::Catalog;
use crate::store::StatusStore;

/// Handler state.
#[derive(Clone)]
pub struct AppState {
    /// Startup configuration, read-only.
    pub config: Arc<AppConfig>,
    /// Transition saga over store, issuer, and clock.
    pub engine: LicenseEngine,
    /// Status document renderer.
    pub assembler: Arc<StatusDocumentAssembler>,
    /// Status message lookup.
    pub localizer: Arc<dyn Localize>,
}

impl AppState {
    /// Wire the components described by `config` around the given collaborators.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn StatusStore>,
        notifier: Arc<dyn IssuerNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = config.policy();
        let links = LinkBuilder::new(config.link_config(), policy.clone());
        let assembler =
            StatusDocumentAssembler::new(links, config.localization.default_language.clone());
        Self {
            engine: LicenseEngine::new(store, notifier, clock, policy),
            assembler: Arc::new(assembler),
            localizer: Arc::new(Catalog::builtin()),
            config: Arc::new(config),
        }
    }

    /// Replace the message catalog.
    pub fn with_localizer(mut self, localizer: Arc<dyn Localize>) -> Self {
        self.localizer = localizer;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
