//! The two grids plus the global cargo pool, with uniform cell addressing.

use crate::cell::{CargoCell, CellBase, GridCell, INVALID_CELL, Overlay};
use crate::geometry::{Coord, CoordF, Size};
use crate::grid::{Grid, GraphError, SeveredConnection};
use crate::id::{CargoId, CellHandle, CellKey, CellRef, GridKind, GridPos, PartId};
use slotmap::SlotMap;

/// All cargo cells of a world. Handles are global across both grids.
pub type CargoPool = SlotMap<CargoId, CargoCell>;

#[derive(Debug, Clone)]
pub struct World {
    model: Grid,
    bank: Grid,
    cargo: CargoPool,
}

impl World {
    pub fn new(model_name: &str, model_size: Size, bank_name: &str, bank_size: Size) -> Self {
        Self {
            model: Grid::new(GridKind::Model, model_name, model_size),
            bank: Grid::new(GridKind::Bank, bank_name, bank_size),
            cargo: CargoPool::with_key(),
        }
    }

    pub fn grid(&self, kind: GridKind) -> &Grid {
        match kind {
            GridKind::Model => &self.model,
            GridKind::Bank => &self.bank,
        }
    }

    pub fn grid_mut(&mut self, kind: GridKind) -> &mut Grid {
        match kind {
            GridKind::Model => &mut self.model,
            GridKind::Bank => &mut self.bank,
        }
    }

    pub fn cargo(&self) -> &CargoPool {
        &self.cargo
    }

    pub fn cargo_cell(&self, id: CargoId) -> Option<&CargoCell> {
        self.cargo.get(id)
    }

    pub fn grid_cell(&self, grid: GridKind, key: CellKey) -> Option<&GridCell> {
        self.grid(grid).cell(key)
    }

    // -----------------------------------------------------------------------
    // Addressing
    // -----------------------------------------------------------------------

    /// Stable reference for a positional handle, if it names a live cell.
    pub fn locate(&self, handle: CellHandle) -> Option<CellRef> {
        match handle {
            CellHandle::Grid(pos) => self
                .grid(pos.grid)
                .key_at(pos.at)
                .map(|key| CellRef::grid(pos.grid, key)),
            CellHandle::Cargo(id) => self.cargo.contains_key(id).then_some(CellRef::Cargo(id)),
        }
    }

    /// Current positional handle of a stable reference.
    pub fn handle_of(&self, cell: CellRef) -> Option<CellHandle> {
        match cell {
            CellRef::Grid { grid, key } => self
                .grid(grid)
                .cell(key)
                .map(|c| CellHandle::Grid(GridPos { grid, at: c.position() })),
            CellRef::Cargo(id) => self.cargo.contains_key(id).then_some(CellHandle::Cargo(id)),
            CellRef::PendingCargo(_) => None,
        }
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        match cell {
            CellRef::Grid { grid, key } => self.grid(grid).contains(key),
            CellRef::Cargo(id) => self.cargo.contains_key(id),
            CellRef::PendingCargo(_) => false,
        }
    }

    /// Property store of `cell`, or the invalid sentinel.
    pub fn cell(&self, cell: CellRef) -> &CellBase {
        let base = match cell {
            CellRef::Grid { grid, key } => self.grid(grid).cell(key).map(GridCell::base),
            CellRef::Cargo(id) => self.cargo.get(id).map(CargoCell::base),
            CellRef::PendingCargo(_) => None,
        };
        base.unwrap_or(&INVALID_CELL)
    }

    pub fn cell_mut(&mut self, cell: CellRef) -> Option<&mut CellBase> {
        match cell {
            CellRef::Grid { grid, key } => self.grid_mut(grid).cell_mut(key).map(GridCell::base_mut),
            CellRef::Cargo(id) => self.cargo.get_mut(id).map(CargoCell::base_mut),
            CellRef::PendingCargo(_) => None,
        }
    }

    /// Property store behind a positional handle, or the invalid sentinel.
    pub fn resolve(&self, handle: CellHandle) -> &CellBase {
        match self.locate(handle) {
            Some(cell) => self.cell(cell),
            None => &INVALID_CELL,
        }
    }

    /// Every live cell: model grid, bank grid, then cargo.
    pub fn all_cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        GridKind::ALL
            .into_iter()
            .flat_map(move |kind| self.grid(kind).keys().map(move |key| CellRef::grid(kind, key)))
            .chain(self.cargo.keys().map(CellRef::Cargo))
    }

    /// Reassign every cell of part `old` to `new`, clearing its properties.
    pub fn reassign_part(&mut self, old: PartId, new: PartId) -> Vec<CellRef> {
        let affected: Vec<CellRef> = self
            .all_cells()
            .filter(|c| self.cell(*c).part() == old)
            .collect();
        for cell in &affected {
            if let Some(base) = self.cell_mut(*cell) {
                base.clear();
                base.set_part(new);
            }
        }
        affected
    }

    /// Give `cell` a different part. Properties are cleared.
    pub fn set_part(&mut self, cell: CellRef, part: PartId) -> bool {
        match self.cell_mut(cell) {
            Some(base) => {
                base.clear();
                base.set_part(part);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    /// Resize a grid and recompute every cargo overlay in it.
    pub fn resize_grid(&mut self, kind: GridKind, size: Size) -> Result<Vec<SeveredConnection>, GraphError> {
        let grid = match kind {
            GridKind::Model => &mut self.model,
            GridKind::Bank => &mut self.bank,
        };
        let severed = grid.resize(size, &mut self.cargo)?;
        self.refresh_overlays(kind);
        Ok(severed)
    }

    /// Insert a row into a grid, shifting cargo with the cells they sit on.
    pub fn insert_row(&mut self, kind: GridKind, k: u32) -> Result<(), GraphError> {
        let grid = match kind {
            GridKind::Model => &mut self.model,
            GridKind::Bank => &mut self.bank,
        };
        grid.insert_row(k, &mut self.cargo)?;
        self.refresh_overlays(kind);
        Ok(())
    }

    pub fn insert_column(&mut self, kind: GridKind, k: u32) -> Result<(), GraphError> {
        let grid = match kind {
            GridKind::Model => &mut self.model,
            GridKind::Bank => &mut self.bank,
        };
        grid.insert_column(k, &mut self.cargo)?;
        self.refresh_overlays(kind);
        Ok(())
    }

    pub fn remove_row(&mut self, kind: GridKind, k: u32) -> Result<Vec<SeveredConnection>, GraphError> {
        let grid = match kind {
            GridKind::Model => &mut self.model,
            GridKind::Bank => &mut self.bank,
        };
        let severed = grid.remove_row(k, &mut self.cargo)?;
        self.refresh_overlays(kind);
        Ok(severed)
    }

    pub fn remove_column(&mut self, kind: GridKind, k: u32) -> Result<Vec<SeveredConnection>, GraphError> {
        let grid = match kind {
            GridKind::Model => &mut self.model,
            GridKind::Bank => &mut self.bank,
        };
        let severed = grid.remove_column(k, &mut self.cargo)?;
        self.refresh_overlays(kind);
        Ok(severed)
    }

    // -----------------------------------------------------------------------
    // Cargo
    // -----------------------------------------------------------------------

    pub fn spawn_cargo(&mut self, cell: CargoCell) -> CargoId {
        let grid = cell.grid;
        let id = self.cargo.insert(cell);
        self.place_overlays(grid, id);
        id
    }

    /// Remove a cargo and every overlay it left on grid cells.
    pub fn destroy_cargo(&mut self, id: CargoId) -> Option<CargoCell> {
        let cargo = self.cargo.remove(id)?;
        let grid = match cargo.grid {
            GridKind::Model => &mut self.model,
            GridKind::Bank => &mut self.bank,
        };
        for key in &cargo.footprint {
            if let Some(cell) = grid.cell_mut(*key) {
                cell.overlays.remove(&id);
            }
        }
        Some(cargo)
    }

    /// Add to the movement a cargo will make at the next settle.
    pub fn accumulate(&mut self, id: CargoId, delta: CoordF) -> bool {
        match self.cargo.get_mut(id) {
            Some(c) => {
                c.delta = c.delta + delta;
                true
            }
            None => false,
        }
    }

    /// Apply accumulated deltas and recompute overlays of the cargo that
    /// moved. Returns the moved handles.
    pub fn settle_cargo(&mut self) -> Vec<CargoId> {
        let mut moved = Vec::new();
        for (id, cargo) in self.cargo.iter_mut() {
            if cargo.delta.is_zero() {
                continue;
            }
            cargo.position = cargo.position + cargo.delta;
            cargo.delta = CoordF::default();
            moved.push(id);
        }
        for id in &moved {
            if let Some(grid) = self.cargo.get(*id).map(|c| c.grid) {
                self.place_overlays(grid, *id);
            }
        }
        moved
    }

    /// Recompute overlays of every cargo in a grid.
    pub fn refresh_overlays(&mut self, kind: GridKind) {
        let ids: Vec<CargoId> = self
            .cargo
            .iter()
            .filter(|(_, c)| c.grid == kind)
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            self.place_overlays(kind, id);
        }
    }

    /// Make `cell` refuse `cargo`. The exclusion survives movement.
    pub fn exclude_cargo(&mut self, kind: GridKind, key: CellKey, cargo: CargoId) -> bool {
        let Some(c) = self.cargo.get_mut(cargo) else {
            return false;
        };
        if c.grid != kind {
            return false;
        }
        let Some(cell) = (match kind {
            GridKind::Model => self.model.cell_mut(key),
            GridKind::Bank => self.bank.cell_mut(key),
        }) else {
            return false;
        };
        cell.overlays.insert(cargo, Overlay::Excluded);
        if !c.footprint.contains(&key) {
            c.footprint.push(key);
        }
        true
    }

    /// Lift an exclusion and let the cargo overlay the cell again.
    pub fn include_cargo(&mut self, kind: GridKind, key: CellKey, cargo: CargoId) -> bool {
        let Some(cell) = self.grid_mut(kind).cell_mut(key) else {
            return false;
        };
        if cell.overlays.get(&cargo) != Some(&Overlay::Excluded) {
            return false;
        }
        cell.overlays.remove(&cargo);
        if self.cargo.get(cargo).is_some_and(|c| c.grid == kind) {
            self.place_overlays(kind, cargo);
        }
        true
    }

    /// Rebuild the overlays of one cargo. Exclusions are kept as they are.
    fn place_overlays(&mut self, kind: GridKind, id: CargoId) {
        let grid = match kind {
            GridKind::Model => &mut self.model,
            GridKind::Bank => &mut self.bank,
        };
        let Some(cargo) = self.cargo.get_mut(id) else {
            return;
        };

        let mut footprint = Vec::new();
        for key in cargo.footprint.drain(..) {
            let Some(cell) = grid.cell_mut(key) else {
                continue;
            };
            if cell.overlays.get(&id) == Some(&Overlay::Excluded) {
                footprint.push(key);
            } else {
                cell.overlays.remove(&id);
            }
        }

        let center = cargo.position.cell();
        for at in covered(cargo.position, cargo.radius, grid.size()) {
            let Some(key) = grid.key_at(at) else {
                continue;
            };
            let Some(cell) = grid.cell_mut(key) else {
                continue;
            };
            if cell.overlays.contains_key(&id) {
                continue;
            }
            let overlay = if at == center {
                Overlay::Centered
            } else {
                Overlay::Artifact
            };
            cell.overlays.insert(id, overlay);
            footprint.push(key);
        }
        cargo.footprint = footprint;
    }
}

/// Cells of a `size` grid whose unit square meets the open square of
/// half-width `radius` around `center`, plus the centre cell when it is in
/// range. Empty for a non-finite centre.
fn covered(center: CoordF, radius: f64, size: Size) -> Vec<Coord> {
    if !center.x.is_finite() || !center.y.is_finite() {
        return Vec::new();
    }
    let r = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
    // Clip in f64 so far-off centres never reach integer overflow.
    let span = |c: f64, len: u32| {
        let lo = ((c - r - 0.5).floor() + 1.0).max(0.0);
        let hi = ((c + r + 0.5).ceil() - 1.0).min(f64::from(len) - 1.0);
        (lo as i32, hi as i32)
    };
    let (x0, x1) = span(center.x, size.width);
    let (y0, y1) = span(center.y, size.height);
    let mut cells: Vec<Coord> = (y0..=y1)
        .flat_map(|y| (x0..=x1).map(move |x| Coord::new(x, y)))
        .collect();
    let center_cell = center.cell();
    if size.contains(center_cell) {
        cells.push(center_cell);
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::PropertyId;
    use crate::value::Value;

    fn world() -> World {
        World::new("main", Size::new(4, 4), "parts", Size::new(2, 1))
    }

    fn key(w: &World, x: i32, y: i32) -> CellKey {
        w.grid(GridKind::Model).key_at(Coord::new(x, y)).unwrap()
    }

    fn overlay(w: &World, x: i32, y: i32, id: CargoId) -> Option<Overlay> {
        w.grid(GridKind::Model).cell_at(Coord::new(x, y)).unwrap().overlay(id)
    }

    #[test]
    fn unknown_handles_resolve_to_the_sentinel() {
        let w = world();
        assert!(w.resolve(GridPos::model(9, 9).into()).is_invalid());
        assert!(!w.resolve(GridPos::model(1, 1).into()).is_invalid());
        assert!(w.locate(GridPos::bank(1, 0).into()).is_some());
        assert!(w.locate(GridPos::bank(2, 0).into()).is_none());
    }

    #[test]
    fn handle_follows_the_cell_after_row_insert() {
        let mut w = world();
        let cell = w.locate(GridPos::model(1, 2).into()).unwrap();
        w.insert_row(GridKind::Model, 0).unwrap();
        assert_eq!(w.handle_of(cell), Some(GridPos::model(1, 3).into()));
    }

    #[test]
    fn small_cargo_has_a_single_centred_overlay() {
        let mut w = world();
        let id = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(1.0, 1.0), 0.25));
        assert_eq!(overlay(&w, 1, 1, id), Some(Overlay::Centered));
        assert_eq!(overlay(&w, 2, 1, id), None);
    }

    #[test]
    fn offset_cargo_leaves_artifacts() {
        let mut w = world();
        let id = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(1.3, 1.0), 0.3));
        assert_eq!(overlay(&w, 1, 1, id), Some(Overlay::Centered));
        assert_eq!(overlay(&w, 2, 1, id), Some(Overlay::Artifact));
        assert_eq!(overlay(&w, 0, 1, id), None);
        assert_eq!(overlay(&w, 1, 0, id), None);
    }

    #[test]
    fn settle_moves_cargo_and_its_overlays() {
        let mut w = world();
        let id = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(0.0, 0.0), 0.2));
        w.accumulate(id, CoordF::new(0.5, 0.0));
        w.accumulate(id, CoordF::new(0.5, 1.0));
        assert_eq!(w.settle_cargo(), vec![id]);
        assert_eq!(w.cargo_cell(id).unwrap().position(), CoordF::new(1.0, 1.0));
        assert_eq!(overlay(&w, 0, 0, id), None);
        assert_eq!(overlay(&w, 1, 1, id), Some(Overlay::Centered));
        assert!(w.settle_cargo().is_empty());
    }

    #[test]
    fn exclusion_is_sticky_until_lifted() {
        let mut w = world();
        let id = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(0.0, 0.0), 0.2));
        let target = key(&w, 1, 0);
        assert!(w.exclude_cargo(GridKind::Model, target, id));
        w.accumulate(id, CoordF::new(1.0, 0.0));
        w.settle_cargo();
        assert_eq!(overlay(&w, 1, 0, id), Some(Overlay::Excluded));
        assert!(w.include_cargo(GridKind::Model, target, id));
        assert_eq!(overlay(&w, 1, 0, id), Some(Overlay::Centered));
    }

    #[test]
    fn destroying_cargo_clears_overlays() {
        let mut w = world();
        let id = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(1.5, 1.5), 0.5));
        w.exclude_cargo(GridKind::Model, key(&w, 3, 3), id);
        assert!(w.destroy_cargo(id).is_some());
        for (_, cell) in w.grid(GridKind::Model).iter() {
            assert!(cell.overlays().is_empty());
        }
        assert!(w.destroy_cargo(id).is_none());
    }

    #[test]
    fn row_insert_drags_centred_cargo() {
        let mut w = world();
        let id = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(2.0, 2.0), 0.2));
        w.insert_row(GridKind::Model, 1).unwrap();
        assert_eq!(w.cargo_cell(id).unwrap().position(), CoordF::new(2.0, 3.0));
        assert_eq!(overlay(&w, 2, 3, id), Some(Overlay::Centered));
        assert_eq!(overlay(&w, 2, 2, id), None);
    }

    #[test]
    fn reassign_part_clears_cells() {
        let mut w = world();
        let cell = w.locate(GridPos::model(0, 0).into()).unwrap();
        w.set_part(cell, PartId(5));
        w.cell_mut(cell).unwrap().set(PropertyId(0), Value::from(1i64));
        w.cell_mut(cell).unwrap().transit();
        let affected = w.reassign_part(PartId(5), PartId::EMPTY);
        assert_eq!(affected, vec![cell]);
        assert_eq!(w.cell(cell).part(), PartId::EMPTY);
        assert_eq!(w.cell(cell).get(PropertyId(0), true), None);
    }

    #[test]
    fn far_off_and_oversized_cargo_stays_inside_the_grid() {
        let mut w = world();
        let far = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(3.0e9, 0.0), 0.3));
        assert!(w.cargo_cell(far).unwrap().footprint.is_empty());
        let lost = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(f64::NAN, 1.0), 0.3));
        assert!(w.cargo_cell(lost).unwrap().footprint.is_empty());

        let big = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(1.0, 1.0), 1.0e12));
        assert_eq!(w.cargo_cell(big).unwrap().radius(), crate::cell::MAX_CARGO_RADIUS);
        assert_eq!(w.cargo_cell(big).unwrap().footprint.len(), 16);
        assert_eq!(overlay(&w, 1, 1, big), Some(Overlay::Centered));
        assert_eq!(overlay(&w, 3, 3, big), Some(Overlay::Artifact));
    }

    #[test]
    fn covered_cells_are_clipped_to_the_grid() {
        let size = Size::new(4, 4);
        assert!(covered(CoordF::new(-1.0e9, -1.0e9), 0.5, size).is_empty());
        assert!(covered(CoordF::new(f64::INFINITY, 0.0), 0.5, size).is_empty());
        let edge = covered(CoordF::new(0.0, 0.0), 0.7, size);
        assert!(edge.iter().all(|&c| size.contains(c)));
        assert!(edge.contains(&Coord::new(1, 1)));
    }

    #[test]
    fn exclusion_only_applies_on_the_cargo_grid() {
        let mut w = world();
        let id = w.spawn_cargo(CargoCell::new(PartId(1), GridKind::Model, CoordF::new(0.0, 0.0), 0.2));
        let bank = w.grid(GridKind::Bank).key_at(Coord::new(0, 0)).unwrap();
        assert!(!w.exclude_cargo(GridKind::Bank, bank, id));
        assert_eq!(w.grid(GridKind::Bank).cell(bank).unwrap().overlay(id), None);
        assert!(!w.cargo_cell(id).unwrap().footprint.contains(&bank));
        w.destroy_cargo(id);
        for (_, cell) in w.grid(GridKind::Bank).iter() {
            assert!(cell.overlays().is_empty());
        }
    }
}
