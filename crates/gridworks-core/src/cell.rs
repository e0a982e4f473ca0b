//! Cell state: the two-phase property store and the grid/cargo cell records.

use crate::geometry::{Coord, CoordF, Direction};
use crate::id::{CargoId, CellKey, ConnectionUse, GridKind, PartId, PropertyId};
use crate::value::Value;
use std::collections::BTreeMap;

/// The read-only cell returned for handles that resolve to nothing.
pub static INVALID_CELL: CellBase = CellBase::new(PartId::INVALID);

// ---------------------------------------------------------------------------
// CellBase
// ---------------------------------------------------------------------------

/// Property storage shared by grid and cargo cells.
///
/// Writes land in `intermediate`; only [`CellBase::transit`] moves them into
/// `committed`. Readers that must see a consistent snapshot ask with
/// `now = false`.
#[derive(Debug, Clone)]
pub struct CellBase {
    part: PartId,
    committed: BTreeMap<PropertyId, Value>,
    intermediate: BTreeMap<PropertyId, Value>,
}

impl CellBase {
    pub const fn new(part: PartId) -> Self {
        Self {
            part,
            committed: BTreeMap::new(),
            intermediate: BTreeMap::new(),
        }
    }

    pub fn part(&self) -> PartId {
        self.part
    }

    pub(crate) fn set_part(&mut self, part: PartId) {
        self.part = part;
    }

    pub fn is_invalid(&self) -> bool {
        self.part == PartId::INVALID
    }

    /// Read a property. With `now` the pending value wins.
    pub fn get(&self, id: PropertyId, now: bool) -> Option<&Value> {
        if now {
            if let Some(v) = self.intermediate.get(&id) {
                return Some(v);
            }
        }
        self.committed.get(&id)
    }

    pub fn set(&mut self, id: PropertyId, value: Value) {
        self.intermediate.insert(id, value);
    }

    /// Merge pending values into the committed map. Returns whether
    /// anything was pending.
    pub fn transit(&mut self) -> bool {
        if self.intermediate.is_empty() {
            return false;
        }
        let pending = std::mem::take(&mut self.intermediate);
        self.committed.extend(pending);
        true
    }

    pub fn rollback(&mut self) {
        self.intermediate.clear();
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.intermediate.clear();
    }

    /// Copy `other`'s committed values into the pending map.
    pub fn adopt(&mut self, other: &CellBase) -> bool {
        for (id, v) in &other.committed {
            self.intermediate.insert(*id, v.clone());
        }
        !other.committed.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.intermediate.is_empty()
    }

    pub fn committed(&self) -> impl Iterator<Item = (PropertyId, &Value)> {
        self.committed.iter().map(|(id, v)| (*id, v))
    }

    pub fn pending(&self) -> impl Iterator<Item = (PropertyId, &Value)> {
        self.intermediate.iter().map(|(id, v)| (*id, v))
    }
}

// ---------------------------------------------------------------------------
// Grid cells
// ---------------------------------------------------------------------------

/// How a cargo relates to a grid cell it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Overlay {
    /// The cargo's centre lies in this cell.
    Centered,
    /// The cargo's extent overlaps this cell.
    Artifact,
    /// The cell refuses to carry the cargo, wherever it is.
    Excluded,
}

/// A cell owned by a grid at a fixed position.
///
/// Relations to other cells are stored as arena keys and kept consistent by
/// the owning [`crate::grid::Grid`]; nothing here mutates them.
#[derive(Debug, Clone)]
pub struct GridCell {
    pub(crate) base: CellBase,
    pub(crate) position: Coord,
    pub(crate) neighbors: [Option<CellKey>; 4],
    pub(crate) connections: BTreeMap<ConnectionUse, CellKey>,
    pub(crate) inverse: BTreeMap<CellKey, u32>,
    pub(crate) overlays: BTreeMap<CargoId, Overlay>,
}

impl GridCell {
    pub(crate) fn new(part: PartId, position: Coord) -> Self {
        Self {
            base: CellBase::new(part),
            position,
            neighbors: [None; 4],
            connections: BTreeMap::new(),
            inverse: BTreeMap::new(),
            overlays: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> &CellBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut CellBase {
        &mut self.base
    }

    pub fn position(&self) -> Coord {
        self.position
    }

    /// Neighbour key in a cardinal direction. `None` for diagonals.
    pub fn neighbor(&self, dir: Direction) -> Option<CellKey> {
        dir.cardinal_slot().and_then(|slot| self.neighbors[slot])
    }

    pub fn connections(&self) -> &BTreeMap<ConnectionUse, CellKey> {
        &self.connections
    }

    pub fn connection(&self, use_: &ConnectionUse) -> Option<CellKey> {
        self.connections.get(use_).copied()
    }

    /// Inbound connection counts keyed by source cell.
    pub fn inverse(&self) -> &BTreeMap<CellKey, u32> {
        &self.inverse
    }

    pub fn inverse_count(&self, source: CellKey) -> u32 {
        self.inverse.get(&source).copied().unwrap_or(0)
    }

    pub fn overlays(&self) -> &BTreeMap<CargoId, Overlay> {
        &self.overlays
    }

    pub fn overlay(&self, cargo: CargoId) -> Option<Overlay> {
        self.overlays.get(&cargo).copied()
    }

    pub fn centered(&self) -> impl Iterator<Item = CargoId> + '_ {
        self.with_overlay(Overlay::Centered)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = CargoId> + '_ {
        self.with_overlay(Overlay::Artifact)
    }

    pub fn excluded(&self) -> impl Iterator<Item = CargoId> + '_ {
        self.with_overlay(Overlay::Excluded)
    }

    fn with_overlay(&self, kind: Overlay) -> impl Iterator<Item = CargoId> + '_ {
        self.overlays
            .iter()
            .filter(move |(_, o)| **o == kind)
            .map(|(id, _)| *id)
    }
}

// ---------------------------------------------------------------------------
// Cargo cells
// ---------------------------------------------------------------------------

/// Largest half-width a cargo cell may cover.
pub const MAX_CARGO_RADIUS: f64 = 64.0;

/// A movable cell with a continuous position inside one grid.
#[derive(Debug, Clone)]
pub struct CargoCell {
    pub(crate) base: CellBase,
    pub(crate) grid: GridKind,
    pub(crate) position: CoordF,
    pub(crate) radius: f64,
    pub(crate) delta: CoordF,
    /// Grid cells currently holding an overlay for this cargo.
    pub(crate) footprint: Vec<CellKey>,
}

impl CargoCell {
    /// `radius` is clamped to `0..=MAX_CARGO_RADIUS`; NaN becomes zero.
    pub fn new(part: PartId, grid: GridKind, position: CoordF, radius: f64) -> Self {
        let radius = if radius.is_nan() { 0.0 } else { radius.clamp(0.0, MAX_CARGO_RADIUS) };
        Self {
            base: CellBase::new(part),
            grid,
            position,
            radius,
            delta: CoordF::default(),
            footprint: Vec::new(),
        }
    }

    pub fn base(&self) -> &CellBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut CellBase {
        &mut self.base
    }

    pub fn grid(&self) -> GridKind {
        self.grid
    }

    pub fn position(&self) -> CoordF {
        self.position
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Movement accumulated this tick and not yet settled.
    pub fn delta(&self) -> CoordF {
        self.delta
    }
}
