//! The transaction buffer and the cell-facing proxy.
//!
//! Behaviours and participants never mutate the world directly. A
//! [`CellProxy`] reads the committed snapshot and records every side effect
//! in a [`Context`]; [`Context::commit`] later applies the whole record at
//! one well-defined point. Until then no other observer can see any of it.
//!
//! # Commit order
//!
//! 1. grid resizes
//! 2. part placements (`clear` on the old part, defaults, `init_static`)
//! 3. disconnects, then connects
//! 4. cargo spawns (pending ids resolved), destroys, moves
//! 5. staged writes, then `transit()` on every changed cell
//! 6. process tab requests, then `apply()`
//! 7. redraws, info and selection updates, messages, delegate errors
//!
//! Cargo moves only accumulate; [`CommitReport::settle`] applies them once
//! for every context committed at the same point.

use crate::cell::{CargoCell, CellBase, GridCell};
use crate::event::Event;
use crate::geometry::{Coord, CoordF, Direction, Size};
use crate::grid::{GraphError, Grid};
use crate::id::{CargoId, CellHandle, CellKey, CellRef, ConnectionUse, GridKind, PartId, PendingCargoId, PropertyId};
use crate::image::Image;
use crate::model::{Model, ModelInfo};
use crate::part::{Behavior, DelegateError, Hook, HookResult, Part, PartRegistry, invoke};
use crate::process_tab::ProcessTab;
use crate::value::{Value, ValueError, ValueType};
use crate::world::World;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A deferred process tab transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRequest {
    Wake,
    Tire,
    Start,
    Halt,
}

/// Wire `source` to the cell at `target` in the same grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub source: CellRef,
    pub connection: ConnectionUse,
    pub target: Coord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub source: CellRef,
    pub connection: ConnectionUse,
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Side effects of one operation, waiting to be committed.
#[derive(Debug, Default)]
pub struct Context {
    writes: BTreeMap<CellRef, BTreeMap<PropertyId, Value>>,
    changed: BTreeSet<CellRef>,
    redraw: BTreeSet<CellRef>,
    connects: Vec<ConnectRequest>,
    disconnects: Vec<DisconnectRequest>,
    spawned: Vec<(PendingCargoId, CargoCell)>,
    next_pending: u64,
    moves: BTreeMap<CellRef, CoordF>,
    destroyed: BTreeSet<CellRef>,
    process: Vec<(ProcessRequest, CellRef)>,
    messages: Vec<String>,
    exceptions: Vec<DelegateError>,
    resizes: Vec<(GridKind, Size)>,
    placements: Vec<(CellRef, PartId)>,
    info: Option<ModelInfo>,
    selection: Option<Vec<CellHandle>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context for one tick worker. Pending cargo ids start in a range of
    /// their own so reports from several workers can be merged.
    pub fn for_worker(worker: usize) -> Self {
        Self::forked((worker as u64) << 32)
    }

    fn forked(next_pending: u64) -> Self {
        Self {
            next_pending,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
            && self.changed.is_empty()
            && self.redraw.is_empty()
            && self.connects.is_empty()
            && self.disconnects.is_empty()
            && self.spawned.is_empty()
            && self.moves.is_empty()
            && self.destroyed.is_empty()
            && self.process.is_empty()
            && self.messages.is_empty()
            && self.exceptions.is_empty()
            && self.resizes.is_empty()
            && self.placements.is_empty()
            && self.info.is_none()
            && self.selection.is_none()
    }

    /// Cells with staged property writes.
    pub fn changed(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.changed.iter().copied()
    }

    pub fn staged(&self, cell: CellRef, id: PropertyId) -> Option<&Value> {
        self.writes.get(&cell).and_then(|props| props.get(&id))
    }

    pub fn exceptions(&self) -> &[DelegateError] {
        &self.exceptions
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    // -----------------------------------------------------------------------
    // Participant-only structural requests
    // -----------------------------------------------------------------------

    pub fn resize_grid(&mut self, grid: GridKind, size: Size) {
        self.resizes.push((grid, size));
    }

    /// Give `cell` a new part at commit. Its properties are reset to the
    /// part's defaults and `init_static` runs.
    pub fn place_part(&mut self, cell: CellRef, part: PartId) {
        self.placements.push((cell, part));
    }

    pub fn update_info(&mut self, info: ModelInfo) {
        self.info = Some(info);
    }

    pub fn select(&mut self, selection: Vec<CellHandle>) {
        self.selection = Some(selection);
    }

    pub fn message(&mut self, text: impl Into<String>) {
        self.messages.push(text.into());
    }

    pub fn report(&mut self, error: DelegateError) {
        self.exceptions.push(error);
    }

    pub fn request(&mut self, request: ProcessRequest, cell: CellRef) {
        self.process.push((request, cell));
    }

    pub fn mark_redraw(&mut self, cell: CellRef) {
        self.redraw.insert(cell);
    }

    fn stage(&mut self, cell: CellRef, id: PropertyId, value: Value, visual: bool) {
        self.writes.entry(cell).or_default().insert(id, value);
        self.changed.insert(cell);
        if visual {
            self.redraw.insert(cell);
        }
    }

    fn spawned_cell(&self, pending: PendingCargoId) -> Option<&CargoCell> {
        self.spawned
            .iter()
            .find(|(p, _)| *p == pending)
            .map(|(_, c)| c)
    }

    /// Part of `cell`, looking through cargo spawned in this context.
    pub fn part_of(&self, world: &World, cell: CellRef) -> PartId {
        match cell {
            CellRef::PendingCargo(p) => self
                .spawned_cell(p)
                .map(|c| c.base().part())
                .unwrap_or(PartId::INVALID),
            other => world.cell(other).part(),
        }
    }

    /// Run one hook of `cell`'s part with a proxy recording into this
    /// context. A failure is recorded as an exception; writes the hook
    /// staged before failing stand. Returns whether the hook succeeded.
    pub fn dispatch<F>(&mut self, world: &World, parts: &PartRegistry, cell: CellRef, hook: Hook, f: F) -> bool
    where
        F: FnOnce(&dyn Behavior, &mut CellProxy<'_>) -> HookResult,
    {
        let Some(part) = parts.get(self.part_of(world, cell)) else {
            return true;
        };
        let handle = world.handle_of(cell);
        let mut proxy = CellProxy::new(world, parts, self, cell);
        match invoke(part, hook, handle, |b| f(b, &mut proxy)) {
            Ok(()) => true,
            Err(err) => {
                self.exceptions.push(err);
                false
            }
        }
    }

    fn absorb(&mut self, other: Context) {
        for (cell, props) in other.writes {
            self.writes.entry(cell).or_default().extend(props);
        }
        self.changed.extend(other.changed);
        self.redraw.extend(other.redraw);
        self.connects.extend(other.connects);
        self.disconnects.extend(other.disconnects);
        self.spawned.extend(other.spawned);
        self.next_pending = self.next_pending.max(other.next_pending);
        for (cell, delta) in other.moves {
            let entry = self.moves.entry(cell).or_default();
            *entry = *entry + delta;
        }
        self.destroyed.extend(other.destroyed);
        self.process.extend(other.process);
        self.messages.extend(other.messages);
        self.exceptions.extend(other.exceptions);
        self.resizes.extend(other.resizes);
        self.placements.extend(other.placements);
        if other.info.is_some() {
            self.info = other.info;
        }
        if other.selection.is_some() {
            self.selection = other.selection;
        }
    }

    // -----------------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------------

    /// Apply everything recorded and leave the context empty.
    pub fn commit(&mut self, model: &mut Model, parts: &PartRegistry, process: &mut ProcessTab) -> CommitReport {
        let mut this = std::mem::take(self);
        let mut report = CommitReport::default();

        let resizes = std::mem::take(&mut this.resizes);
        let resized = !resizes.is_empty();
        for (grid, size) in resizes {
            match model.world.resize_grid(grid, size) {
                Ok(severed) => {
                    for s in severed {
                        report.events.push(Event::ConnectionRemoved {
                            grid,
                            source: s.source,
                            connection: s.connection,
                            target: s.target,
                        });
                    }
                    report.events.push(Event::GridResized { grid, size });
                }
                Err(err) => tracing::warn!(%grid, %size, %err, "grid resize failed"),
            }
        }
        if resized {
            let world = &model.world;
            process.retain(|cell| world.contains(cell));
        }

        for (cell, part) in std::mem::take(&mut this.placements) {
            this.place(&mut model.world, parts, cell, part);
        }

        for req in std::mem::take(&mut this.disconnects) {
            let CellRef::Grid { grid, key } = req.source else {
                report.dropped += 1;
                continue;
            };
            let g = model.world.grid_mut(grid);
            match g.remove_connection(key, &req.connection) {
                Ok(Some(target)) => report.events.push(Event::ConnectionRemoved {
                    grid,
                    source: position(g, key),
                    connection: req.connection,
                    target: position(g, target),
                }),
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(%grid, %err, "disconnect from a vanished cell dropped");
                    report.dropped += 1;
                }
            }
        }

        for req in std::mem::take(&mut this.connects) {
            let CellRef::Grid { grid, key } = req.source else {
                tracing::warn!(connection = %req.connection, "only grid cells can be wired");
                report.dropped += 1;
                continue;
            };
            let g = model.world.grid_mut(grid);
            let Some(target) = g.key_at(req.target) else {
                tracing::warn!(%grid, connection = %req.connection, target = %req.target, "connection target does not exist");
                report.dropped += 1;
                continue;
            };
            match g.add_connection(key, req.connection.clone(), target) {
                Ok(replaced) => {
                    let source = position(g, key);
                    if let Some(old) = replaced {
                        report.events.push(Event::ConnectionRemoved {
                            grid,
                            source,
                            connection: req.connection.clone(),
                            target: position(g, old),
                        });
                    }
                    report.events.push(Event::ConnectionAdded {
                        grid,
                        source,
                        connection: req.connection,
                        target: req.target,
                    });
                }
                Err(err) => {
                    tracing::warn!(%grid, %err, "connect request dropped");
                    report.dropped += 1;
                }
            }
        }

        let mut resolved: BTreeMap<PendingCargoId, CargoId> = BTreeMap::new();
        for (pending, cargo) in std::mem::take(&mut this.spawned) {
            let (grid, at) = (cargo.grid(), cargo.position());
            let id = model.world.spawn_cargo(cargo);
            resolved.insert(pending, id);
            report.spawned.push((pending, id));
            report.events.push(Event::CargoSpawned { cargo: id, grid, at });
        }
        let resolve = |cell: CellRef| match cell {
            CellRef::PendingCargo(p) => resolved.get(&p).map(|id| CellRef::Cargo(*id)),
            other => Some(other),
        };

        for cell in std::mem::take(&mut this.destroyed) {
            let Some(CellRef::Cargo(id)) = resolve(cell) else {
                tracing::warn!(?cell, "only cargo can be destroyed directly");
                report.dropped += 1;
                continue;
            };
            if model.world.destroy_cargo(id).is_some() {
                process.forget(CellRef::Cargo(id));
                report.events.push(Event::CargoDestroyed { cargo: id });
            }
        }

        for (cell, delta) in std::mem::take(&mut this.moves) {
            if let Some(CellRef::Cargo(id)) = resolve(cell) {
                model.world.accumulate(id, delta);
            }
        }

        for (cell, props) in std::mem::take(&mut this.writes) {
            let Some(base) = resolve(cell).and_then(|c| model.world.cell_mut(c)) else {
                continue;
            };
            for (id, value) in props {
                base.set(id, value);
            }
        }
        for cell in std::mem::take(&mut this.changed) {
            if let Some(base) = resolve(cell).and_then(|c| model.world.cell_mut(c)) {
                if base.transit() {
                    report.transited += 1;
                }
            }
        }

        for (request, cell) in std::mem::take(&mut this.process) {
            let Some(cell) = resolve(cell) else {
                continue;
            };
            match request {
                ProcessRequest::Wake => process.wake(cell),
                ProcessRequest::Tire => process.tire(cell),
                ProcessRequest::Start => process.start(cell),
                ProcessRequest::Halt => process.halt(cell),
            }
        }
        process.apply();

        let world = &model.world;
        for cell in std::mem::take(&mut this.redraw) {
            let Some(cell) = resolve(cell) else {
                continue;
            };
            let Some(handle) = world.handle_of(cell) else {
                continue;
            };
            let Some(part) = parts.get(world.cell(cell).part()) else {
                continue;
            };
            let view = CellView::new(world, parts, cell);
            let mut image = Image::default();
            match invoke(part, Hook::Draw, Some(handle), |b| b.draw(&view, &mut image)) {
                Ok(()) => report.events.push(Event::Redraw { cell: handle, image }),
                Err(err) => this.exceptions.push(err),
            }
        }

        if let Some(info) = this.info.take() {
            model.info = info.clone();
            report.events.push(Event::InfoUpdated { info });
        }
        if let Some(selection) = this.selection.take() {
            report.events.push(Event::SelectionUpdated { selection });
        }
        for text in std::mem::take(&mut this.messages) {
            report.events.push(Event::Message { text });
        }
        for error in std::mem::take(&mut this.exceptions) {
            report.events.push(Event::Exception { error });
        }

        tracing::trace!(
            transited = report.transited,
            events = report.events.len(),
            dropped = report.dropped,
            "context committed"
        );
        report
    }

    fn place(&mut self, world: &mut World, parts: &PartRegistry, cell: CellRef, part: PartId) {
        if !world.contains(cell) {
            tracing::warn!(?cell, "placement on a vanished cell dropped");
            return;
        }
        let Some(schema) = parts.get(part).map(Arc::clone) else {
            tracing::warn!(part = part.0, "placement of an unknown part dropped");
            return;
        };
        let mut scratch = Context::forked(self.next_pending);
        scratch.dispatch(world, parts, cell, Hook::Clear, |b, c| b.clear(c));
        // Writes from the clear hook belong to the outgoing part.
        scratch.writes.remove(&cell);
        scratch.changed.remove(&cell);

        world.set_part(cell, part);
        if let Some(base) = world.cell_mut(cell) {
            for entry in schema.properties() {
                base.set(entry.id, entry.default.clone());
            }
        }
        self.changed.insert(cell);
        self.redraw.insert(cell);
        scratch.dispatch(world, parts, cell, Hook::InitStatic, |b, c| b.init_static(c));
        self.absorb(scratch);
    }
}

fn position(grid: &Grid, key: CellKey) -> Coord {
    grid.cell(key).map(GridCell::position).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Commit report
// ---------------------------------------------------------------------------

/// What a commit did. Maps pending cargo ids to the real ones, the same way
/// a graph mutation result resolves pending node ids.
#[derive(Debug, Default, Clone)]
pub struct CommitReport {
    pub events: Vec<Event>,
    pub spawned: Vec<(PendingCargoId, CargoId)>,
    /// Cells whose pending values were transited.
    pub transited: usize,
    /// Requests that could not be resolved against the world.
    pub dropped: usize,
}

impl CommitReport {
    pub fn resolve_cargo(&self, pending: PendingCargoId) -> Option<CargoId> {
        self.spawned
            .iter()
            .find(|(p, _)| *p == pending)
            .map(|(_, id)| *id)
    }

    pub fn absorb(&mut self, other: CommitReport) {
        self.events.extend(other.events);
        self.spawned.extend(other.spawned);
        self.transited += other.transited;
        self.dropped += other.dropped;
    }

    /// Apply accumulated cargo movement and record where cargo ended up.
    pub fn settle(&mut self, world: &mut World) {
        for id in world.settle_cargo() {
            if let Some(cargo) = world.cargo_cell(id) {
                self.events.push(Event::CargoMoved {
                    cargo: id,
                    to: cargo.position(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cell proxy
// ---------------------------------------------------------------------------

/// A cell as seen by a behaviour hook or a participant transaction.
///
/// Reads with [`CellProxy::get`] see the committed snapshot. Everything the
/// proxy changes is staged in its context.
pub struct CellProxy<'a> {
    world: &'a World,
    parts: &'a PartRegistry,
    context: &'a mut Context,
    cell: CellRef,
}

impl<'a> CellProxy<'a> {
    pub fn new(world: &'a World, parts: &'a PartRegistry, context: &'a mut Context, cell: CellRef) -> Self {
        Self {
            world,
            parts,
            context,
            cell,
        }
    }

    /// A proxy for another cell, recording into the same context.
    pub fn at(&mut self, cell: CellRef) -> CellProxy<'_> {
        CellProxy {
            world: self.world,
            parts: self.parts,
            context: &mut *self.context,
            cell,
        }
    }

    pub fn view(&self) -> CellView<'a> {
        CellView::new(self.world, self.parts, self.cell)
    }

    pub fn cell(&self) -> CellRef {
        self.cell
    }

    pub fn handle(&self) -> Option<CellHandle> {
        self.world.handle_of(self.cell)
    }

    pub fn world(&self) -> &'a World {
        self.world
    }

    pub fn is_valid(&self) -> bool {
        match self.cell {
            CellRef::PendingCargo(p) => self.context.spawned_cell(p).is_some(),
            other => self.world.contains(other),
        }
    }

    pub fn part(&self) -> PartId {
        self.context.part_of(self.world, self.cell)
    }

    pub fn schema(&self) -> Option<&'a Arc<Part>> {
        self.parts.get(self.part())
    }

    fn base(&self) -> Option<&CellBase> {
        match self.cell {
            CellRef::PendingCargo(p) => self.context.spawned_cell(p).map(CargoCell::base),
            other if self.world.contains(other) => Some(self.world.cell(other)),
            _ => None,
        }
    }

    fn default_of(&self, id: PropertyId) -> Option<Value> {
        self.schema().and_then(|p| p.default_of(id)).cloned()
    }

    /// Committed value, falling back to the part's default.
    pub fn get(&self, id: PropertyId) -> Option<Value> {
        self.base()
            .and_then(|b| b.get(id, false))
            .cloned()
            .or_else(|| self.default_of(id))
    }

    /// Latest value including writes staged in this context.
    pub fn get_now(&self, id: PropertyId) -> Option<Value> {
        self.context
            .staged(self.cell, id)
            .or_else(|| self.base().and_then(|b| b.get(id, true)))
            .cloned()
            .or_else(|| self.default_of(id))
    }

    pub fn read<T: ValueType>(&self, id: PropertyId) -> Result<T, ValueError> {
        self.get(id).ok_or(ValueError::Unset(id.0))?.get::<T>()
    }

    pub fn read_now<T: ValueType>(&self, id: PropertyId) -> Result<T, ValueError> {
        self.get_now(id).ok_or(ValueError::Unset(id.0))?.get::<T>()
    }

    pub fn set(&mut self, id: PropertyId, value: impl Into<Value>) {
        let visual = self.schema().is_some_and(|p| p.is_visual(id));
        self.context.stage(self.cell, id, value.into(), visual);
    }

    pub fn redraw(&mut self) {
        self.context.mark_redraw(self.cell);
    }

    // -- Geometry --

    pub fn grid_kind(&self) -> Option<GridKind> {
        match self.cell {
            CellRef::Grid { grid, .. } => Some(grid),
            CellRef::Cargo(id) => self.world.cargo_cell(id).map(CargoCell::grid),
            CellRef::PendingCargo(p) => self.context.spawned_cell(p).map(CargoCell::grid),
        }
    }

    fn grid_cell(&self) -> Option<&'a GridCell> {
        match self.cell {
            CellRef::Grid { grid, key } => self.world.grid_cell(grid, key),
            _ => None,
        }
    }

    /// Position of a grid cell.
    pub fn position(&self) -> Option<Coord> {
        self.grid_cell().map(GridCell::position)
    }

    /// Position of a cargo cell.
    pub fn cargo_position(&self) -> Option<CoordF> {
        match self.cell {
            CellRef::Cargo(id) => self.world.cargo_cell(id).map(CargoCell::position),
            CellRef::PendingCargo(p) => self.context.spawned_cell(p).map(CargoCell::position),
            CellRef::Grid { .. } => None,
        }
    }

    pub fn neighbor(&self, dir: Direction) -> Result<Option<CellRef>, GraphError> {
        let CellRef::Grid { grid, key } = self.cell else {
            return Ok(None);
        };
        let next = self.world.grid(grid).neighbor(key, dir)?;
        Ok(next.map(|k| CellRef::grid(grid, k)))
    }

    pub fn connection(&self, connection: &ConnectionUse) -> Option<CellRef> {
        let CellRef::Grid { grid, .. } = self.cell else {
            return None;
        };
        self.grid_cell()?
            .connection(connection)
            .map(|k| CellRef::grid(grid, k))
    }

    pub fn connections(&self) -> Vec<(ConnectionUse, CellRef)> {
        let (Some(cell), Some(grid)) = (self.grid_cell(), self.grid_kind()) else {
            return Vec::new();
        };
        cell.connections()
            .iter()
            .map(|(u, k)| (u.clone(), CellRef::grid(grid, *k)))
            .collect()
    }

    /// Cells with at least one wire into this one.
    pub fn sources(&self) -> Vec<CellRef> {
        let (Some(cell), Some(grid)) = (self.grid_cell(), self.grid_kind()) else {
            return Vec::new();
        };
        cell.inverse().keys().map(|k| CellRef::grid(grid, *k)).collect()
    }

    pub fn centered_cargo(&self) -> Vec<CargoId> {
        self.grid_cell().map(|c| c.centered().collect()).unwrap_or_default()
    }

    pub fn artifacts(&self) -> Vec<CargoId> {
        self.grid_cell().map(|c| c.artifacts().collect()).unwrap_or_default()
    }

    /// The grid cell a committed cargo is centred on.
    pub fn host(&self) -> Option<CellRef> {
        let CellRef::Cargo(id) = self.cell else {
            return None;
        };
        let cargo = self.world.cargo_cell(id)?;
        let key = self.world.grid(cargo.grid()).key_at(cargo.position().cell())?;
        Some(CellRef::grid(cargo.grid(), key))
    }

    // -- Structural requests --

    pub fn connect(&mut self, connection: ConnectionUse, target: Coord) {
        self.context.connects.push(ConnectRequest {
            source: self.cell,
            connection,
            target,
        });
    }

    pub fn disconnect(&mut self, connection: ConnectionUse) {
        self.context.disconnects.push(DisconnectRequest {
            source: self.cell,
            connection,
        });
    }

    /// Stage a new cargo of `part` in this cell's grid, sized by the part.
    pub fn spawn_cargo(&mut self, part: PartId, at: CoordF) -> PendingCargoId {
        let radius = self.parts.get(part).map_or(0.5, |p| p.cargo_radius());
        self.spawn_cargo_sized(part, at, radius)
    }

    pub fn spawn_cargo_sized(&mut self, part: PartId, at: CoordF, radius: f64) -> PendingCargoId {
        let grid = self.grid_kind().unwrap_or(GridKind::Model);
        let mut cargo = CargoCell::new(part, grid, at, radius);
        if let Some(schema) = self.parts.get(part) {
            for entry in schema.properties() {
                cargo.base_mut().set(entry.id, entry.default.clone());
            }
        }
        let pending = PendingCargoId(self.context.next_pending);
        self.context.next_pending += 1;
        self.context.spawned.push((pending, cargo));
        let cell = CellRef::PendingCargo(pending);
        self.context.changed.insert(cell);
        self.context.redraw.insert(cell);
        pending
    }

    /// Move a cargo by `delta` at the next settle. Deltas accumulate.
    pub fn push_cargo(&mut self, cargo: CellRef, delta: CoordF) {
        let entry = self.context.moves.entry(cargo).or_default();
        *entry = *entry + delta;
    }

    /// Move this cargo.
    pub fn push(&mut self, delta: CoordF) {
        self.push_cargo(self.cell, delta);
    }

    pub fn destroy_cargo(&mut self, cargo: CellRef) {
        self.context.destroyed.insert(cargo);
    }

    // -- Activity --

    pub fn wake(&mut self) {
        self.context.request(ProcessRequest::Wake, self.cell);
    }

    pub fn tire(&mut self) {
        self.context.request(ProcessRequest::Tire, self.cell);
    }

    pub fn start(&mut self) {
        self.context.request(ProcessRequest::Start, self.cell);
    }

    pub fn halt(&mut self) {
        self.context.request(ProcessRequest::Halt, self.cell);
    }

    pub fn message(&mut self, text: impl Into<String>) {
        self.context.message(text);
    }
}

// ---------------------------------------------------------------------------
// Read-only view
// ---------------------------------------------------------------------------

/// A committed cell as seen by the draw hook.
#[derive(Clone, Copy)]
pub struct CellView<'a> {
    world: &'a World,
    parts: &'a PartRegistry,
    cell: CellRef,
}

impl<'a> CellView<'a> {
    pub fn new(world: &'a World, parts: &'a PartRegistry, cell: CellRef) -> Self {
        Self { world, parts, cell }
    }

    pub fn cell(&self) -> CellRef {
        self.cell
    }

    pub fn handle(&self) -> Option<CellHandle> {
        self.world.handle_of(self.cell)
    }

    pub fn part(&self) -> PartId {
        self.world.cell(self.cell).part()
    }

    pub fn get(&self, id: PropertyId) -> Option<Value> {
        self.world
            .cell(self.cell)
            .get(id, false)
            .cloned()
            .or_else(|| self.parts.get(self.part()).and_then(|p| p.default_of(id)).cloned())
    }

    pub fn read<T: ValueType>(&self, id: PropertyId) -> Result<T, ValueError> {
        self.get(id).ok_or(ValueError::Unset(id.0))?.get::<T>()
    }
}
