//! Capability host for runtime-loaded plugins.
//!
//! Plugins contribute capabilities (content providers, link extractors,
//! action handlers and resource override sets) that are registered by key and
//! owner, and removed in one step when the owning plugin unloads. A resource
//! overlay serves resources through the currently selected override set.
//!
//! # Example
//!
//! ```rust,ignore
//! use capability_host::{Capability, CapabilityHost, HostConfig, OverrideSet, OwnerId, ResourceValue};
//! use std::sync::Arc;
//!
//! let host = CapabilityHost::new(HostConfig::default());
//! let owner = OwnerId::new("plugins/dark-theme");
//!
//! let pack = OverrideSet::new("Dark").with_static(0x7f01_0001, ResourceValue::Color(0xff101010));
//! host.register_capability("dark-pack", Capability::OverrideSet(Arc::new(pack)), Some(owner.clone()))?;
//! host.on_plugins_loaded(true);
//! host.select_override_set(Some("dark-pack"));
//!
//! let overlay = host.overlay(platform_resolver);
//! let background = overlay.color(0x7f01_0001, None)?;
//!
//! // Unloading the plugin clears the selection
//! host.unregister_owner(&owner);
//! ```

mod capability;
mod config;
mod error;
mod host;
mod overlay;
mod owner_index;
mod registry;
mod selector;
mod settings;

pub use capability::*;
pub use config::*;
pub use error::*;
pub use host::*;
pub use overlay::*;
pub use owner_index::*;
pub use registry::*;
pub use selector::*;
pub use settings::*;
