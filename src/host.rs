//! Main capability host implementation.

use std::sync::Arc;

use crate::capability::{ActionHandler, Capability, CapabilityKind, ContentProvider, LinkExtractor};
use crate::config::HostConfig;
use crate::error::RegistrationError;
use crate::overlay::{ResourceOverlay, ResourceResolver};
use crate::owner_index::OwnerId;
use crate::registry::ExtensionRegistry;
use crate::selector::{OverlaySelector, OverrideRegistry, RefreshListener, SelectionState};
use crate::settings::{JsonFileSettings, SettingsStore};

/// Capabilities removed when a plugin was unloaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnloadReport {
    pub removed: Vec<(CapabilityKind, String)>,
}

impl UnloadReport {
    /// Nothing was removed.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    /// Number of removed capabilities.
    pub fn len(&self) -> usize {
        self.removed.len()
    }
}

/// Host-side owner of every capability registry and the override selection.
pub struct CapabilityHost {
    config: HostConfig,
    providers: Arc<ExtensionRegistry<String, dyn ContentProvider>>,
    extractors: Arc<ExtensionRegistry<String, dyn LinkExtractor>>,
    actions: Arc<ExtensionRegistry<String, dyn ActionHandler>>,
    override_sets: Arc<OverrideRegistry>,
    selector: Arc<OverlaySelector>,
}

impl CapabilityHost {
    /// Create a host persisting its selection to the configured settings file.
    pub fn new(config: HostConfig) -> Self {
        let settings = Arc::new(JsonFileSettings::new(config.settings_path.clone()));
        Self::with_collaborators(config, settings, None)
    }

    /// Create a host with custom settings storage and UI refresh listener.
    pub fn with_collaborators(
        config: HostConfig,
        settings: Arc<dyn SettingsStore>,
        refresh: Option<Arc<dyn RefreshListener>>,
    ) -> Self {
        let override_sets = Arc::new(OverrideRegistry::new());
        let selector = OverlaySelector::with_refresh(
            override_sets.clone(),
            settings,
            config.settings_key.clone(),
            refresh,
        );

        Self {
            config,
            providers: Arc::new(ExtensionRegistry::new()),
            extractors: Arc::new(ExtensionRegistry::new()),
            actions: Arc::new(ExtensionRegistry::new()),
            override_sets,
            selector,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    // === Plugin boundary ===

    /// Register a capability under its natural key.
    pub fn register(
        &self,
        capability: Capability,
        owner: Option<OwnerId>,
    ) -> Result<(), RegistrationError> {
        let key = capability.default_key();
        self.register_capability(key, capability, owner)
    }

    /// Register a capability under `key`.
    pub fn register_capability(
        &self,
        key: impl Into<String>,
        capability: Capability,
        owner: Option<OwnerId>,
    ) -> Result<(), RegistrationError> {
        let key = key.into();
        match capability {
            Capability::ContentProvider(p) => self.providers.register(key, p, owner),
            Capability::LinkExtractor(e) => self.extractors.register(key, e, owner),
            Capability::ActionHandler(a) => self.actions.register(key, a, owner),
            Capability::OverrideSet(s) => self.override_sets.register(key, s, owner),
        }
    }

    /// Unregister one capability.
    pub fn unregister_capability(&self, kind: CapabilityKind, key: &str) -> Option<Capability> {
        let key = key.to_string();
        match kind {
            CapabilityKind::ContentProvider => {
                self.providers.unregister(&key).map(Capability::ContentProvider)
            }
            CapabilityKind::LinkExtractor => {
                self.extractors.unregister(&key).map(Capability::LinkExtractor)
            }
            CapabilityKind::ActionHandler => {
                self.actions.unregister(&key).map(Capability::ActionHandler)
            }
            CapabilityKind::OverrideSet => {
                self.override_sets.unregister(&key).map(Capability::OverrideSet)
            }
        }
    }

    /// Remove every capability registered by `owner`.
    ///
    /// When this returns, none of the owner's capabilities can be looked up
    /// and a selection pointing at one of its override sets is cleared.
    pub fn unregister_owner(&self, owner: &OwnerId) -> UnloadReport {
        let mut report = UnloadReport::default();

        fn record_removed<C: ?Sized>(
            report: &mut UnloadReport,
            kind: CapabilityKind,
            removed: Vec<(String, Arc<C>)>,
        ) {
            report
                .removed
                .extend(removed.into_iter().map(|(key, _)| (kind, key)));
        }

        record_removed(&mut report, CapabilityKind::ContentProvider, self.providers.unregister_all(owner));
        record_removed(&mut report, CapabilityKind::LinkExtractor, self.extractors.unregister_all(owner));
        record_removed(&mut report, CapabilityKind::ActionHandler, self.actions.unregister_all(owner));
        record_removed(&mut report, CapabilityKind::OverrideSet, self.override_sets.unregister_all(owner));

        if !report.is_empty() {
            tracing::info!("Unloaded {} capabilities from {}", report.len(), owner);
        }
        report
    }

    /// Deliver the "all plugins loaded" event.
    pub fn on_plugins_loaded(&self, success: bool) -> SelectionState {
        self.selector.on_plugins_loaded(success)
    }

    // === Override selection ===

    /// Select the active override set, or clear it with `None`.
    pub fn select_override_set(&self, id: Option<&str>) -> SelectionState {
        self.selector.select(id)
    }

    /// Get the override selector.
    pub fn selector(&self) -> &Arc<OverlaySelector> {
        &self.selector
    }

    /// Wrap `base` in an overlay bound to this host's selection.
    pub fn overlay(&self, base: Arc<dyn ResourceResolver>) -> ResourceOverlay {
        ResourceOverlay::new(base, self.selector.clone())
    }

    // === Registries ===

    /// Content providers, keyed by name.
    pub fn providers(&self) -> &Arc<ExtensionRegistry<String, dyn ContentProvider>> {
        &self.providers
    }

    /// Link extractors, keyed by name.
    pub fn extractors(&self) -> &Arc<ExtensionRegistry<String, dyn LinkExtractor>> {
        &self.extractors
    }

    /// Action handlers, keyed by unique id.
    pub fn actions(&self) -> &Arc<ExtensionRegistry<String, dyn ActionHandler>> {
        &self.actions
    }

    /// Override sets, keyed by set id.
    pub fn override_sets(&self) -> &Arc<OverrideRegistry> {
        &self.override_sets
    }

    // === Lookups ===

    /// Get a content provider by name.
    pub fn provider_by_name(&self, name: &str) -> Option<Arc<dyn ContentProvider>> {
        self.providers.lookup(&name.to_string())
    }

    /// Find an extractor handling `url`.
    ///
    /// When several match, the most recently registered one wins.
    pub fn extractor_for_url(&self, url: &str) -> Option<Arc<dyn LinkExtractor>> {
        self.extractors
            .all(|_, e| e.matches(url))
            .last()
            .map(|(_, e)| e)
    }

    /// Action handlers that can act as the default player.
    pub fn players(&self) -> Vec<Arc<dyn ActionHandler>> {
        let mut players: Vec<(String, Arc<dyn ActionHandler>)> =
            self.actions.all(|_, a| a.is_player()).collect();
        players.sort_by(|(a, _), (b, _)| a.cmp(b));
        players.into_iter().map(|(_, a)| a).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::tests::RecordingResolver;
    use crate::overlay::{OverrideSet, ResourceKind, ResourceValue, Theme};
    use crate::settings::MemorySettings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Provider(&'static str);

    impl ContentProvider for Provider {
        fn name(&self) -> &str {
            self.0
        }

        fn main_url(&self) -> &str {
            "https://provider.example"
        }
    }

    struct Extractor(&'static str, &'static str);

    impl LinkExtractor for Extractor {
        fn name(&self) -> &str {
            self.0
        }

        fn main_url(&self) -> &str {
            self.1
        }
    }

    struct Action(&'static str, bool);

    impl ActionHandler for Action {
        fn unique_id(&self) -> &str {
            self.0
        }

        fn name(&self) -> &str {
            self.0
        }

        fn is_player(&self) -> bool {
            self.1
        }
    }

    fn test_host() -> (CapabilityHost, Arc<MemorySettings>) {
        let settings = Arc::new(MemorySettings::new());
        let host = CapabilityHost::with_collaborators(
            HostConfig::new("unused.json".into()),
            settings.clone(),
            None,
        );
        (host, settings)
    }

    fn owner(id: &str) -> Option<OwnerId> {
        Some(OwnerId::new(id))
    }

    #[test]
    fn test_register_each_kind() {
        let (host, _) = test_host();

        host.register(Capability::ContentProvider(Arc::new(Provider("Site"))), owner("p"))
            .unwrap();
        host.register(
            Capability::LinkExtractor(Arc::new(Extractor("Host", "https://host.example"))),
            owner("p"),
        )
        .unwrap();
        host.register(Capability::ActionHandler(Arc::new(Action("vlc", true))), None)
            .unwrap();
        host.register_capability(
            "pack",
            Capability::OverrideSet(Arc::new(OverrideSet::new("Pack"))),
            owner("p"),
        )
        .unwrap();

        assert!(host.provider_by_name("Site").is_some());
        assert!(host.extractors().contains(&"Host".to_string()));
        assert_eq!(host.players().len(), 1);
        assert!(host.override_sets().contains(&"pack".to_string()));

        let err = host
            .register(Capability::ContentProvider(Arc::new(Provider("Site"))), owner("q"))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::AlreadyRegistered(_)));
    }

    #[test]
    fn test_unregister_owner_cascades_all_kinds() {
        let (host, _) = test_host();
        host.register(Capability::ContentProvider(Arc::new(Provider("A"))), owner("p"))
            .unwrap();
        host.register(Capability::ActionHandler(Arc::new(Action("copy", false))), owner("p"))
            .unwrap();
        host.register(Capability::ContentProvider(Arc::new(Provider("B"))), owner("q"))
            .unwrap();

        let report = host.unregister_owner(&OwnerId::new("p"));

        assert_eq!(report.len(), 2);
        assert!(report
            .removed
            .contains(&(CapabilityKind::ContentProvider, "A".to_string())));
        assert!(host.provider_by_name("A").is_none());
        assert!(host.provider_by_name("B").is_some());
        assert!(host.actions().is_empty());
        assert!(host.unregister_owner(&OwnerId::new("p")).is_empty());
    }

    #[test]
    fn test_unregister_single_capability() {
        let (host, _) = test_host();
        host.register(Capability::ContentProvider(Arc::new(Provider("A"))), owner("p"))
            .unwrap();

        let removed = host.unregister_capability(CapabilityKind::ContentProvider, "A");
        assert!(matches!(removed, Some(Capability::ContentProvider(_))));
        assert!(host
            .unregister_capability(CapabilityKind::ContentProvider, "A")
            .is_none());
        assert!(host.providers().keys_of(&OwnerId::new("p")).is_empty());
    }

    #[test]
    fn test_extractor_for_url_latest_registration_wins() {
        let (host, _) = test_host();
        host.register(
            Capability::LinkExtractor(Arc::new(Extractor("Embed", "https://host.example/embed"))),
            owner("p"),
        )
        .unwrap();
        host.register(
            Capability::LinkExtractor(Arc::new(Extractor("Generic", "https://host.example"))),
            owner("q"),
        )
        .unwrap();

        let found = host.extractor_for_url("https://host.example/embed/42").unwrap();
        assert_eq!(found.name(), "Generic");
        let found = host.extractor_for_url("https://host.example/v/42").unwrap();
        assert_eq!(found.name(), "Generic");

        // Once the newer one is unloaded the older match is used again
        host.unregister_owner(&OwnerId::new("q"));
        let found = host.extractor_for_url("https://host.example/embed/42").unwrap();
        assert_eq!(found.name(), "Embed");
        assert!(host.extractor_for_url("https://host.example/v/42").is_none());
        assert!(host.extractor_for_url("https://elsewhere.example").is_none());
    }

    #[test]
    fn test_extractor_for_url_normalizes_url() {
        let (host, _) = test_host();
        host.register(
            Capability::LinkExtractor(Arc::new(Extractor("Host", "https://host.example"))),
            None,
        )
        .unwrap();

        for url in [
            "https://www.host.example/e/1",
            "HTTPS://HOST.EXAMPLE/E/1",
            "//host.example/e/1",
            "//WWW.Host.Example/e/1",
        ] {
            let found = host.extractor_for_url(url);
            assert_eq!(found.map(|e| e.name().to_string()).as_deref(), Some("Host"), "{}", url);
        }
        assert!(host.extractor_for_url("http://host.example/e/1").is_none());
    }

    #[test]
    fn test_dark_pack_scenario() {
        let (host, settings) = test_host();
        let base = Arc::new(RecordingResolver::default());
        let overlay = host.overlay(base.clone());

        let pack = OverrideSet::new("Dark").with_themed_generator(100, ResourceKind::Text, |theme| {
            Ok(Some(ResourceValue::Text(format!("dark:{}", theme.name))))
        });
        host.register_capability("dark-pack", Capability::OverrideSet(Arc::new(pack)), owner("pluginA"))
            .unwrap();

        assert_eq!(
            host.select_override_set(Some("dark-pack")),
            SelectionState::Selected("dark-pack".into())
        );

        let night = Theme::named("night");
        assert_eq!(
            overlay.resolve(100, ResourceKind::Text, Some(&night)).unwrap(),
            ResourceValue::Text("dark:night".into())
        );

        host.unregister_owner(&OwnerId::new("pluginA"));

        // Selection is cleared before unregister_owner returns
        assert_eq!(host.selector().state(), SelectionState::Unselected);
        assert_eq!(settings.get_string("selected_resource_pack").unwrap(), None);
        assert_eq!(
            overlay.resolve(100, ResourceKind::Text, Some(&night)).unwrap(),
            ResourceValue::Text("base:100".into())
        );
    }

    #[test]
    fn test_plugins_loaded_activates_persisted_set() {
        let settings = Arc::new(MemorySettings::new());
        settings
            .set_string("selected_resource_pack", Some("dark-pack"))
            .unwrap();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = refreshes.clone();
        let refresh: Arc<dyn RefreshListener> = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let host = CapabilityHost::with_collaborators(
            HostConfig::new("unused.json".into()),
            settings,
            Some(refresh),
        );

        let pack = OverrideSet::new("Dark").with_static(1, ResourceValue::Color(0xff000000));
        host.register_capability("dark-pack", Capability::OverrideSet(Arc::new(pack)), owner("pluginA"))
            .unwrap();

        assert_eq!(
            host.on_plugins_loaded(true),
            SelectionState::Selected("dark-pack".into())
        );
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        let overlay = host.overlay(Arc::new(RecordingResolver::default()));
        assert_eq!(overlay.color(1, None).unwrap(), 0xff000000);
    }

    #[test]
    fn test_file_backed_host() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig::new(dir.path().join("settings.json"));

        let host = CapabilityHost::new(config.clone());
        host.register_capability(
            "pack",
            Capability::OverrideSet(Arc::new(OverrideSet::new("Pack"))),
            owner("p"),
        )
        .unwrap();
        host.select_override_set(Some("pack"));
        drop(host);

        let host = CapabilityHost::new(config);
        assert_eq!(host.selector().state(), SelectionState::Pending("pack".into()));
        // Plugin never came back
        assert_eq!(host.on_plugins_loaded(true), SelectionState::Unselected);
    }
}
