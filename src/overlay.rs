//! Resource overlay in front of the host's resource resolver.
//!
//! Every lookup is remapped, offered to the active override set and only then
//! delegated to the base resolver. The active set is re-read on each call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, ResolveError};

/// Numeric resource identifier.
pub type ResourceId = u32;

/// Resource families the overlay can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Layout,
    Drawable,
    Color,
    ColorStateList,
    Text,
    Raw,
    Dimension,
    Integer,
    Boolean,
    Font,
}

/// A resolved resource value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    /// Layout source document
    Layout(Arc<str>),
    /// Encoded image data
    Drawable(Arc<[u8]>),
    /// ARGB color
    Color(u32),
    /// Colors per state, first entry is the default
    ColorStateList(Arc<[u32]>),
    Text(String),
    Raw(Arc<[u8]>),
    Dimension(f32),
    Integer(i32),
    Boolean(bool),
    /// Font family name
    Font(String),
}

impl ResourceValue {
    /// Kind of this value.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceValue::Layout(_) => ResourceKind::Layout,
            ResourceValue::Drawable(_) => ResourceKind::Drawable,
            ResourceValue::Color(_) => ResourceKind::Color,
            ResourceValue::ColorStateList(_) => ResourceKind::ColorStateList,
            ResourceValue::Text(_) => ResourceKind::Text,
            ResourceValue::Raw(_) => ResourceKind::Raw,
            ResourceValue::Dimension(_) => ResourceKind::Dimension,
            ResourceValue::Integer(_) => ResourceKind::Integer,
            ResourceValue::Boolean(_) => ResourceKind::Boolean,
            ResourceValue::Font(_) => ResourceKind::Font,
        }
    }
}

/// Theme context passed to theme-aware resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Theme {
    pub name: String,
}

impl Theme {
    /// Create a theme by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::named("default")
    }
}

/// Output of an override generator. `Ok(None)` means "no override".
pub type GeneratorResult = Result<Option<ResourceValue>, BoxError>;

type Generator = Arc<dyn Fn() -> GeneratorResult + Send + Sync>;
type ThemedGenerator = Arc<dyn Fn(&Theme) -> GeneratorResult + Send + Sync>;

/// One override for a resource id.
#[derive(Clone)]
pub enum OverrideEntry {
    /// Fixed value
    Static(ResourceValue),
    /// Value computed on every lookup
    Generator { kind: ResourceKind, generate: Generator },
    /// Value computed from the caller's theme
    ThemedGenerator {
        kind: ResourceKind,
        generate: ThemedGenerator,
    },
}

impl OverrideEntry {
    /// Kind this entry produces.
    pub fn kind(&self) -> ResourceKind {
        match self {
            OverrideEntry::Static(value) => value.kind(),
            OverrideEntry::Generator { kind, .. } | OverrideEntry::ThemedGenerator { kind, .. } => {
                *kind
            }
        }
    }
}

impl fmt::Debug for OverrideEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverrideEntry::Static(value) => f.debug_tuple("Static").field(value).finish(),
            OverrideEntry::Generator { kind, .. } => {
                f.debug_struct("Generator").field("kind", kind).finish_non_exhaustive()
            }
            OverrideEntry::ThemedGenerator { kind, .. } => f
                .debug_struct("ThemedGenerator")
                .field("kind", kind)
                .finish_non_exhaustive(),
        }
    }
}

/// A resource pack: overrides keyed by resource id.
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    name: String,
    entries: HashMap<ResourceId, OverrideEntry>,
}

impl OverrideSet {
    /// Create an empty override set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Display name of the set.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a fixed override.
    pub fn with_static(mut self, id: ResourceId, value: ResourceValue) -> Self {
        self.entries.insert(id, OverrideEntry::Static(value));
        self
    }

    /// Add an override computed on each lookup.
    pub fn with_generator(
        mut self,
        id: ResourceId,
        kind: ResourceKind,
        generate: impl Fn() -> GeneratorResult + Send + Sync + 'static,
    ) -> Self {
        self.entries.insert(
            id,
            OverrideEntry::Generator {
                kind,
                generate: Arc::new(generate),
            },
        );
        self
    }

    /// Add a theme-aware override.
    pub fn with_themed_generator(
        mut self,
        id: ResourceId,
        kind: ResourceKind,
        generate: impl Fn(&Theme) -> GeneratorResult + Send + Sync + 'static,
    ) -> Self {
        self.entries.insert(
            id,
            OverrideEntry::ThemedGenerator {
                kind,
                generate: Arc::new(generate),
            },
        );
        self
    }

    /// Override entry for `id`.
    pub fn get(&self, id: ResourceId) -> Option<&OverrideEntry> {
        self.entries.get(&id)
    }

    /// Number of overridden ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no id is overridden.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identifier substitutions applied before any lookup.
#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    map: HashMap<ResourceId, ResourceId>,
}

impl RemapTable {
    /// Create an empty table; every id maps to itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a substitution.
    pub fn with(mut self, from: ResourceId, to: ResourceId) -> Self {
        self.map.insert(from, to);
        self
    }

    /// Substitute id, or the id itself when unmapped.
    pub fn map_id(&self, id: ResourceId) -> ResourceId {
        self.map.get(&id).copied().unwrap_or(id)
    }
}

impl FromIterator<(ResourceId, ResourceId)> for RemapTable {
    fn from_iter<I: IntoIterator<Item = (ResourceId, ResourceId)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// The host platform's resource resolver.
pub trait ResourceResolver: Send + Sync {
    /// Resolve a resource of the given kind.
    fn resolve(
        &self,
        id: ResourceId,
        kind: ResourceKind,
        theme: Option<&Theme>,
    ) -> Result<ResourceValue, ResolveError>;

    /// Theme used for theme-aware overrides when the caller passes none.
    fn default_theme(&self) -> Theme {
        Theme::default()
    }
}

/// Source of the currently active override set.
pub trait ActiveOverride: Send + Sync {
    /// Snapshot of the active set, if any.
    fn active(&self) -> Option<Arc<OverrideSet>>;
}

impl ActiveOverride for Option<Arc<OverrideSet>> {
    fn active(&self) -> Option<Arc<OverrideSet>> {
        self.clone()
    }
}

/// Proxy resolver consulting the active override set first.
pub struct ResourceOverlay {
    base: Arc<dyn ResourceResolver>,
    active: Arc<dyn ActiveOverride>,
    remap: RemapTable,
}

impl ResourceOverlay {
    /// Create an overlay over `base`.
    pub fn new(base: Arc<dyn ResourceResolver>, active: Arc<dyn ActiveOverride>) -> Self {
        Self {
            base,
            active,
            remap: RemapTable::new(),
        }
    }

    /// Set the identifier remap table.
    pub fn with_remap(mut self, remap: RemapTable) -> Self {
        self.remap = remap;
        self
    }

    /// Resolve `id` as `kind`.
    pub fn resolve(
        &self,
        id: ResourceId,
        kind: ResourceKind,
        theme: Option<&Theme>,
    ) -> Result<ResourceValue, ResolveError> {
        let id = self.remap.map_id(id);

        if let Some(set) = self.active.active() {
            if let Some(entry) = set.get(id) {
                if let Some(value) = self.apply_override(id, kind, entry, theme)? {
                    return Ok(value);
                }
            }
        }

        self.base.resolve(id, kind, theme)
    }

    /// Evaluate one override entry; `Ok(None)` falls through to the base.
    fn apply_override(
        &self,
        id: ResourceId,
        kind: ResourceKind,
        entry: &OverrideEntry,
        theme: Option<&Theme>,
    ) -> Result<Option<ResourceValue>, ResolveError> {
        if entry.kind() != kind {
            tracing::debug!(
                "Ignoring override for {:#x}: entry is {:?}, requested {:?}",
                id,
                entry.kind(),
                kind
            );
            return Ok(None);
        }

        let produced = match entry {
            OverrideEntry::Static(value) => return Ok(Some(value.clone())),
            OverrideEntry::Generator { generate, .. } => generate(),
            OverrideEntry::ThemedGenerator { generate, .. } => match theme {
                Some(theme) => generate(theme),
                None => generate(&self.base.default_theme()),
            },
        };

        match produced {
            Ok(Some(value)) if value.kind() == kind => Ok(Some(value)),
            Ok(Some(value)) => {
                tracing::debug!(
                    "Ignoring generated override for {:#x}: produced {:?}, requested {:?}",
                    id,
                    value.kind(),
                    kind
                );
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(source) => Err(ResolveError::OverrideFailed { id, source }),
        }
    }

    /// Resolve a layout document.
    pub fn layout(&self, id: ResourceId) -> Result<Arc<str>, ResolveError> {
        match self.resolve(id, ResourceKind::Layout, None)? {
            ResourceValue::Layout(layout) => Ok(layout),
            other => Err(mismatch(id, ResourceKind::Layout, &other)),
        }
    }

    /// Resolve image data.
    pub fn drawable(&self, id: ResourceId, theme: Option<&Theme>) -> Result<Arc<[u8]>, ResolveError> {
        match self.resolve(id, ResourceKind::Drawable, theme)? {
            ResourceValue::Drawable(data) => Ok(data),
            other => Err(mismatch(id, ResourceKind::Drawable, &other)),
        }
    }

    /// Resolve an ARGB color.
    pub fn color(&self, id: ResourceId, theme: Option<&Theme>) -> Result<u32, ResolveError> {
        match self.resolve(id, ResourceKind::Color, theme)? {
            ResourceValue::Color(color) => Ok(color),
            other => Err(mismatch(id, ResourceKind::Color, &other)),
        }
    }

    /// Resolve a color state list.
    pub fn color_state_list(
        &self,
        id: ResourceId,
        theme: Option<&Theme>,
    ) -> Result<Arc<[u32]>, ResolveError> {
        match self.resolve(id, ResourceKind::ColorStateList, theme)? {
            ResourceValue::ColorStateList(colors) => Ok(colors),
            other => Err(mismatch(id, ResourceKind::ColorStateList, &other)),
        }
    }

    /// Resolve a string.
    pub fn text(&self, id: ResourceId) -> Result<String, ResolveError> {
        match self.resolve(id, ResourceKind::Text, None)? {
            ResourceValue::Text(text) => Ok(text),
            other => Err(mismatch(id, ResourceKind::Text, &other)),
        }
    }

    /// Resolve raw bytes.
    pub fn raw(&self, id: ResourceId) -> Result<Arc<[u8]>, ResolveError> {
        match self.resolve(id, ResourceKind::Raw, None)? {
            ResourceValue::Raw(bytes) => Ok(bytes),
            other => Err(mismatch(id, ResourceKind::Raw, &other)),
        }
    }

    /// Resolve a dimension.
    pub fn dimension(&self, id: ResourceId) -> Result<f32, ResolveError> {
        match self.resolve(id, ResourceKind::Dimension, None)? {
            ResourceValue::Dimension(value) => Ok(value),
            other => Err(mismatch(id, ResourceKind::Dimension, &other)),
        }
    }

    /// Resolve an integer.
    pub fn integer(&self, id: ResourceId) -> Result<i32, ResolveError> {
        match self.resolve(id, ResourceKind::Integer, None)? {
            ResourceValue::Integer(value) => Ok(value),
            other => Err(mismatch(id, ResourceKind::Integer, &other)),
        }
    }

    /// Resolve a boolean.
    pub fn boolean(&self, id: ResourceId) -> Result<bool, ResolveError> {
        match self.resolve(id, ResourceKind::Boolean, None)? {
            ResourceValue::Boolean(value) => Ok(value),
            other => Err(mismatch(id, ResourceKind::Boolean, &other)),
        }
    }

    /// Resolve a font family name.
    pub fn font(&self, id: ResourceId) -> Result<String, ResolveError> {
        match self.resolve(id, ResourceKind::Font, None)? {
            ResourceValue::Font(family) => Ok(family),
            other => Err(mismatch(id, ResourceKind::Font, &other)),
        }
    }
}

fn mismatch(id: ResourceId, expected: ResourceKind, actual: &ResourceValue) -> ResolveError {
    ResolveError::UnexpectedKind {
        id,
        expected,
        actual: actual.kind(),
    }
}
