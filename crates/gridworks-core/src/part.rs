//! Part schemas, behaviours and the part registry.
//!
//! A part is a registered component kind: a property schema plus a
//! [`Behavior`] implementation. Cells refer to their part by [`PartId`]; the
//! registry resolves the id to the shared [`Part`] when a hook must run.

use crate::context::{CellProxy, CellView};
use crate::geometry::CoordF;
use crate::id::{CellHandle, PartId, PropertyId};
use crate::image::Image;
use crate::value::{PartNames, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Error type returned by behaviour hooks.
pub type BehaviorError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a behaviour hook.
pub type HookResult = Result<(), BehaviorError>;

// ---------------------------------------------------------------------------
// Behaviour
// ---------------------------------------------------------------------------

/// Per-part behaviour. Every hook defaults to a no-op.
///
/// Hooks never touch the world directly. Writes go through the
/// [`CellProxy`], which stages them in the active context; reads through
/// `CellProxy::get` observe the committed snapshot only.
pub trait Behavior: Send + Sync + fmt::Debug {
    /// Called when a cell takes this part.
    fn init_static(&self, _cell: &mut CellProxy<'_>) -> HookResult {
        Ok(())
    }

    /// Called for every cell after a model load, once all cells exist.
    fn init_relative(&self, cell: &mut CellProxy<'_>) -> HookResult {
        self.init_static(cell)
    }

    /// Called before a cell gives this part up.
    fn clear(&self, _cell: &mut CellProxy<'_>) -> HookResult {
        Ok(())
    }

    fn cycle(&self, _cell: &mut CellProxy<'_>) -> HookResult {
        Ok(())
    }

    /// The per-tick move hook.
    fn moving(&self, _cell: &mut CellProxy<'_>) -> HookResult {
        Ok(())
    }

    fn draw(&self, _cell: &CellView<'_>, _image: &mut Image) -> HookResult {
        Ok(())
    }

    fn press(&self, _cell: &mut CellProxy<'_>, _at: CoordF) -> HookResult {
        Ok(())
    }

    fn release(&self, _cell: &mut CellProxy<'_>, _at: CoordF) -> HookResult {
        Ok(())
    }

    /// A user edit of an editable property. Stages the value by default.
    fn regulate(&self, cell: &mut CellProxy<'_>, id: PropertyId, value: Value) -> HookResult {
        cell.set(id, value);
        Ok(())
    }
}

/// Behaviour of the empty part.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inert;

impl Behavior for Inert {}

/// Names the hook a [`DelegateError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    InitStatic,
    InitRelative,
    Clear,
    Cycle,
    Move,
    Draw,
    Press,
    Release,
    Regulate,
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Hook::InitStatic => "init_static",
            Hook::InitRelative => "init_relative",
            Hook::Clear => "clear",
            Hook::Cycle => "cycle",
            Hook::Move => "move",
            Hook::Draw => "draw",
            Hook::Press => "press",
            Hook::Release => "release",
            Hook::Regulate => "regulate",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A behaviour hook failed or panicked. Reported to participants, never
/// propagated out of a tick.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{hook} hook of part {part:?} failed: {message}")]
pub struct DelegateError {
    pub part: String,
    pub hook: Hook,
    pub cell: Option<CellHandle>,
    pub message: String,
}

/// Run one hook of `part`, turning an error or a panic into a
/// [`DelegateError`].
pub fn invoke<F>(part: &Part, hook: Hook, cell: Option<CellHandle>, f: F) -> Result<(), DelegateError>
where
    F: FnOnce(&dyn Behavior) -> HookResult,
{
    let outcome = catch_unwind(AssertUnwindSafe(|| f(part.behavior())));
    let message = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err.to_string(),
        Err(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                format!("panicked: {s}")
            } else if let Some(s) = payload.downcast_ref::<String>() {
                format!("panicked: {s}")
            } else {
                "panicked".to_string()
            }
        }
    };
    tracing::warn!(part = %part.name(), hook = %hook, ?cell, %message, "behaviour hook failed");
    Err(DelegateError {
        part: part.name().to_string(),
        hook,
        cell,
        message,
    })
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// How a property is treated outside the simulation proper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyPolicy {
    /// A write marks the cell for redraw.
    pub visual: bool,
    /// Written to saved models.
    pub persistent: bool,
    /// The UI may regulate it.
    pub editable: bool,
}

impl Default for PropertyPolicy {
    fn default() -> Self {
        Self {
            visual: false,
            persistent: true,
            editable: false,
        }
    }
}

/// One property declared by a part.
#[derive(Debug, Clone)]
pub struct PropertyEntry {
    pub id: PropertyId,
    pub name: String,
    pub default: Value,
    pub policy: PropertyPolicy,
}

impl PropertyEntry {
    pub fn new(id: u32, name: &str, default: impl Into<Value>) -> Self {
        Self {
            id: PropertyId(id),
            name: name.to_string(),
            default: default.into(),
            policy: PropertyPolicy::default(),
        }
    }

    pub fn visual(mut self) -> Self {
        self.policy.visual = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.policy.editable = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.policy.persistent = false;
        self
    }
}

/// A registered component kind.
#[derive(Debug, Clone)]
pub struct Part {
    name: String,
    description: String,
    properties: Vec<PropertyEntry>,
    behavior: Arc<dyn Behavior>,
    cargo_radius: f64,
}

impl Part {
    pub fn builder(name: &str) -> PartBuilder {
        PartBuilder {
            part: Part {
                name: name.to_string(),
                description: String::new(),
                properties: Vec::new(),
                behavior: Arc::new(Inert),
                cargo_radius: 0.5,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn properties(&self) -> &[PropertyEntry] {
        &self.properties
    }

    pub fn behavior(&self) -> &dyn Behavior {
        self.behavior.as_ref()
    }

    /// Radius given to cargo of this part when none is requested.
    pub fn cargo_radius(&self) -> f64 {
        self.cargo_radius
    }

    pub fn entry(&self, id: PropertyId) -> Option<&PropertyEntry> {
        self.properties.iter().find(|e| e.id == id)
    }

    pub fn entry_by_name(&self, name: &str) -> Option<&PropertyEntry> {
        self.properties.iter().find(|e| e.name == name)
    }

    pub fn default_of(&self, id: PropertyId) -> Option<&Value> {
        self.entry(id).map(|e| &e.default)
    }

    pub fn is_visual(&self, id: PropertyId) -> bool {
        self.entry(id).is_some_and(|e| e.policy.visual)
    }

    pub fn is_persistent(&self, id: PropertyId) -> bool {
        self.entry(id).is_some_and(|e| e.policy.persistent)
    }
}

/// Builder for [`Part`].
#[derive(Debug)]
pub struct PartBuilder {
    part: Part,
}

impl PartBuilder {
    pub fn description(mut self, text: &str) -> Self {
        self.part.description = text.to_string();
        self
    }

    /// Declare a property. A later entry with the same id replaces the
    /// earlier one.
    pub fn property(mut self, entry: PropertyEntry) -> Self {
        self.part.properties.retain(|e| e.id != entry.id);
        self.part.properties.push(entry);
        self
    }

    pub fn behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.part.behavior = Arc::new(behavior);
        self
    }

    pub fn cargo_radius(mut self, radius: f64) -> Self {
        self.part.cargo_radius = radius;
        self
    }

    pub fn build(self) -> Part {
        self.part
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Name of the part every registry starts with.
pub const EMPTY_PART_NAME: &str = "empty";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a part named {0:?} is already registered")]
    DuplicateName(String),
    #[error("part not found: {0}")]
    NotFound(String),
    #[error("part {0:?} cannot be removed")]
    Protected(String),
}

/// The simulation's part inventory.
///
/// Ids are never reused; removing a part leaves a hole so stale ids resolve
/// to nothing rather than to an unrelated part.
#[derive(Debug, Clone)]
pub struct PartRegistry {
    parts: Vec<Option<Arc<Part>>>,
    by_name: HashMap<String, PartId>,
}

impl Default for PartRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PartRegistry {
    pub fn new() -> Self {
        let empty = Part::builder(EMPTY_PART_NAME)
            .description("blank cell")
            .build();
        let mut by_name = HashMap::new();
        by_name.insert(EMPTY_PART_NAME.to_string(), PartId::EMPTY);
        Self {
            parts: vec![Some(Arc::new(empty))],
            by_name,
        }
    }

    pub fn register(&mut self, part: Part) -> Result<PartId, RegistryError> {
        if self.by_name.contains_key(part.name()) {
            return Err(RegistryError::DuplicateName(part.name().to_string()));
        }
        let id = PartId(self.parts.len() as u32);
        self.by_name.insert(part.name().to_string(), id);
        self.parts.push(Some(Arc::new(part)));
        Ok(id)
    }

    /// Unregister a part. The caller reassigns its cells.
    pub fn remove(&mut self, id: PartId) -> Result<Arc<Part>, RegistryError> {
        if id == PartId::EMPTY {
            return Err(RegistryError::Protected(EMPTY_PART_NAME.to_string()));
        }
        let part = self
            .parts
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or_else(|| RegistryError::NotFound(format!("#{}", id.0)))?;
        self.by_name.remove(part.name());
        Ok(part)
    }

    pub fn get(&self, id: PartId) -> Option<&Arc<Part>> {
        self.parts.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn id_of(&self, name: &str) -> Option<PartId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Result<&Arc<Part>, RegistryError> {
        self.id_of(name)
            .and_then(|id| self.get(id))
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn contains(&self, id: PartId) -> bool {
        self.get(id).is_some()
    }

    /// Registered parts in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PartId, &Arc<Part>)> {
        self.parts
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.as_ref().map(|p| (PartId(i as u32), p)))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl PartNames for PartRegistry {
    fn part_name(&self, id: PartId) -> Option<&str> {
        self.get(id).map(|p| p.name())
    }

    fn part_id(&self, name: &str) -> Option<PartId> {
        self.id_of(name)
    }
}
