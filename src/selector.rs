//! Selection of the single active override set.
//!
//! The chosen set id is persisted through a [`SettingsStore`]. On startup the
//! stored id is held as pending until all plugins have loaded, then validated
//! against the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use arc_swap::ArcSwapOption;

use crate::overlay::{ActiveOverride, OverrideSet};
use crate::registry::{ExtensionRegistry, ObserverId, RemovalObserver};
use crate::settings::SettingsStore;

/// Registry holding override sets, keyed by set id.
pub type OverrideRegistry = ExtensionRegistry<String, OverrideSet>;

/// Selection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    /// No override set active
    Unselected,
    /// Persisted choice waiting for plugins to finish loading
    Pending(String),
    /// Override set in use
    Selected(String),
}

/// Receives "selection changed, please re-render" notifications.
pub trait RefreshListener: Send + Sync {
    fn selection_changed(&self);
}

impl<F> RefreshListener for F
where
    F: Fn() + Send + Sync,
{
    fn selection_changed(&self) {
        self()
    }
}

/// Owns the active override set.
pub struct OverlaySelector {
    registry: Arc<OverrideRegistry>,
    settings: Arc<dyn SettingsStore>,
    settings_key: String,
    refresh: Option<Arc<dyn RefreshListener>>,
    state: Mutex<SelectionState>,
    active: ArcSwapOption<OverrideSet>,
    /// Serializes settings writes; never held together with the registry lock
    persist_lock: Mutex<()>,
    observer: ObserverId,
}

/// Clears the selection when the selected set is unregistered.
///
/// The in-memory transition happens under the registry write lock, the
/// settings write after it is released.
struct SelectionObserver {
    selector: Weak<OverlaySelector>,
    cleared: AtomicBool,
}

impl RemovalObserver<String, OverrideSet> for SelectionObserver {
    fn removed(&self, key: &String, _: &Arc<OverrideSet>) {
        if let Some(selector) = self.selector.upgrade() {
            if selector.handle_removed(key) {
                self.cleared.store(true, Ordering::Release);
            }
        }
    }

    fn settled(&self) {
        if self.cleared.swap(false, Ordering::AcqRel) {
            if let Some(selector) = self.selector.upgrade() {
                selector.flush();
            }
        }
    }
}

impl OverlaySelector {
    /// Create a selector without a refresh listener.
    pub fn new(
        registry: Arc<OverrideRegistry>,
        settings: Arc<dyn SettingsStore>,
        settings_key: impl Into<String>,
    ) -> Arc<Self> {
        Self::with_refresh(registry, settings, settings_key, None)
    }

    /// Create a selector, restoring the persisted choice as pending.
    ///
    /// Registers a removal observer on `registry` so that unregistering the
    /// selected set clears the selection. The observer is detached when the
    /// selector is dropped.
    pub fn with_refresh(
        registry: Arc<OverrideRegistry>,
        settings: Arc<dyn SettingsStore>,
        settings_key: impl Into<String>,
        refresh: Option<Arc<dyn RefreshListener>>,
    ) -> Arc<Self> {
        let settings_key = settings_key.into();

        let initial = match settings.get_string(&settings_key) {
            Ok(Some(id)) if !id.trim().is_empty() => {
                tracing::debug!("Restored override set selection {} as pending", id);
                SelectionState::Pending(id)
            }
            Ok(_) => SelectionState::Unselected,
            Err(e) => {
                tracing::warn!("Failed to read override set selection: {}", e);
                SelectionState::Unselected
            }
        };

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let observer = registry.add_observer(Arc::new(SelectionObserver {
                selector: weak.clone(),
                cleared: AtomicBool::new(false),
            }));

            Self {
                registry,
                settings,
                settings_key,
                refresh,
                state: Mutex::new(initial),
                active: ArcSwapOption::empty(),
                persist_lock: Mutex::new(()),
                observer,
            }
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SelectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the current selection to the settings store.
    ///
    /// Must be called without the registry lock held. The value is read under
    /// `persist_lock`, so the last flush always stores the latest state.
    fn flush(&self) {
        let _guard = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let value = match &*self.lock_state() {
            SelectionState::Selected(id) => Some(id.clone()),
            SelectionState::Unselected => None,
            // Keep the stored choice until it can be validated
            SelectionState::Pending(_) => return,
        };

        if let Err(e) = self.settings.set_string(&self.settings_key, value.as_deref()) {
            tracing::warn!("Failed to persist override set selection: {}", e);
        }
    }

    fn notify_refresh(&self) {
        if let Some(refresh) = &self.refresh {
            refresh.selection_changed();
        }
    }

    /// Current state.
    pub fn state(&self) -> SelectionState {
        self.lock_state().clone()
    }

    /// Id of the selected set, if one is active.
    pub fn active_key(&self) -> Option<String> {
        match &*self.lock_state() {
            SelectionState::Selected(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Select an override set by id, or clear the selection with `None`.
    ///
    /// Unknown ids clear the selection instead of failing. The refresh
    /// listener is notified once per call.
    pub fn select(&self, id: Option<&str>) -> SelectionState {
        let new_state = match id {
            None => {
                let mut state = self.lock_state();
                *state = SelectionState::Unselected;
                self.active.store(None);
                state.clone()
            }
            Some(id) => {
                let id = id.to_string();
                // Registry read lock first, then our state: same order as the
                // removal observer, which runs under the registry write lock.
                self.registry.with_lookup(&id, |found| {
                    let mut state = self.lock_state();
                    match found {
                        Some(set) => {
                            self.active.store(Some(set.clone()));
                            tracing::info!("Selected override set: {}", id);
                            *state = SelectionState::Selected(id.clone());
                        }
                        None => {
                            tracing::debug!("Override set {} not registered, clearing selection", id);
                            self.active.store(None);
                            *state = SelectionState::Unselected;
                        }
                    }
                    state.clone()
                })
            }
        };

        self.flush();
        self.notify_refresh();
        new_state
    }

    /// Handle the "all plugins loaded" event.
    ///
    /// A failed load keeps a pending choice pending.
    pub fn on_plugins_loaded(&self, success: bool) -> SelectionState {
        let pending = match &*self.lock_state() {
            SelectionState::Pending(id) if success => id.clone(),
            other => return other.clone(),
        };

        let (new_state, activated, cleared) = self.registry.with_lookup(&pending, |found| {
            let mut state = self.lock_state();
            if *state != SelectionState::Pending(pending.clone()) {
                // A select() call won the race
                return (state.clone(), false, false);
            }
            match found {
                Some(set) => {
                    self.active.store(Some(set.clone()));
                    tracing::info!("Activated persisted override set: {}", pending);
                    *state = SelectionState::Selected(pending.clone());
                    (state.clone(), true, false)
                }
                None => {
                    tracing::info!("Persisted override set {} is gone, clearing", pending);
                    self.active.store(None);
                    *state = SelectionState::Unselected;
                    (state.clone(), false, true)
                }
            }
        });

        if cleared {
            self.flush();
        }
        if activated {
            self.notify_refresh();
        }
        new_state
    }

    /// Clear the selection if `id` is selected. Returns whether it was.
    ///
    /// Runs under the registry write lock, so only in-memory state changes.
    fn handle_removed(&self, id: &str) -> bool {
        let mut state = self.lock_state();
        match &*state {
            SelectionState::Selected(selected) if selected == id => {
                tracing::info!("Selected override set {} was unregistered, clearing", id);
                self.active.store(None);
                *state = SelectionState::Unselected;
                true
            }
            _ => false,
        }
    }
}

impl ActiveOverride for OverlaySelector {
    fn active(&self) -> Option<Arc<OverrideSet>> {
        self.active.load_full()
    }
}

impl Drop for OverlaySelector {
    fn drop(&mut self) {
        self.registry.remove_observer(self.observer);
    }
}
