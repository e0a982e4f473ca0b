//! A rectangular grid of cells and the maintenance of its reference graph.
//!
//! Cells live in a [`SlotMap`] arena and refer to each other by [`CellKey`].
//! Every function that changes a relation updates both ends before it
//! returns, so the following hold between calls:
//!
//! - if A's neighbour in direction D is B, B's neighbour opposite D is A;
//! - `B.inverse[A]` equals the number of A's connections that target B;
//! - `rows[y][x]` is the key of the cell whose position is `(x, y)`.

use crate::cell::GridCell;
use crate::geometry::{Coord, Direction, Size};
use crate::id::{CellKey, ConnectionUse, GridKind, PartId};
use crate::world::CargoPool;
use slotmap::SlotMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("direction {0} does not address a neighbour")]
    InvalidDirection(Direction),
    #[error("cell not found: {0:?}")]
    CellNotFound(CellKey),
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: u32, len: u32 },
    #[error("inconsistent grid: {0}")]
    Inconsistent(String),
    #[error("a {0} grid exceeds {MAX_GRID_CELLS} cells")]
    TooLarge(Size),
}

/// Most cells a single grid may hold.
pub const MAX_GRID_CELLS: u64 = 1 << 22;

/// Whether a grid of `size` stays within [`MAX_GRID_CELLS`].
pub fn size_fits(size: Size) -> bool {
    u64::from(size.width) * u64::from(size.height) <= MAX_GRID_CELLS
}

/// A connection removed as a side effect of destroying a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeveredConnection {
    pub source: Coord,
    pub connection: ConnectionUse,
    pub target: Coord,
}

fn slots(dir: Direction) -> Result<(usize, usize), GraphError> {
    match (dir.cardinal_slot(), dir.opposite().cardinal_slot()) {
        (Some(there), Some(back)) => Ok((there, back)),
        _ => Err(GraphError::InvalidDirection(dir)),
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Grid {
    kind: GridKind,
    name: String,
    size: Size,
    cells: SlotMap<CellKey, GridCell>,
    rows: Vec<Vec<CellKey>>,
}

impl Grid {
    /// A grid of blank cells, fully linked.
    pub fn new(kind: GridKind, name: &str, size: Size) -> Self {
        let mut cells = SlotMap::with_key();
        let rows: Vec<Vec<CellKey>> = (0..size.height)
            .map(|y| {
                (0..size.width)
                    .map(|x| cells.insert(GridCell::new(PartId::EMPTY, Coord::new(x as i32, y as i32))))
                    .collect()
            })
            .collect();
        for y in 0..rows.len() {
            for x in 0..rows[y].len() {
                let key = rows[y][x];
                if let Some(&east) = rows[y].get(x + 1) {
                    cells[key].neighbors[1] = Some(east);
                    cells[east].neighbors[3] = Some(key);
                }
                if let Some(&south) = rows.get(y + 1).and_then(|r| r.get(x)) {
                    cells[key].neighbors[2] = Some(south);
                    cells[south].neighbors[0] = Some(key);
                }
            }
        }
        Self {
            kind,
            name: name.to_string(),
            size,
            cells,
            rows,
        }
    }

    pub fn kind(&self) -> GridKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn key_at(&self, at: Coord) -> Option<CellKey> {
        if !self.size.contains(at) {
            return None;
        }
        Some(self.rows[at.y as usize][at.x as usize])
    }

    pub fn cell(&self, key: CellKey) -> Option<&GridCell> {
        self.cells.get(key)
    }

    pub fn cell_mut(&mut self, key: CellKey) -> Option<&mut GridCell> {
        self.cells.get_mut(key)
    }

    pub fn cell_at(&self, at: Coord) -> Option<&GridCell> {
        self.key_at(at).and_then(|k| self.cells.get(k))
    }

    pub fn contains(&self, key: CellKey) -> bool {
        self.cells.contains_key(key)
    }

    /// Keys in row-major order.
    pub fn keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.rows.iter().flatten().copied()
    }

    /// Cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (CellKey, &GridCell)> + '_ {
        self.keys().filter_map(|k| self.cells.get(k).map(|c| (k, c)))
    }

    fn require(&self, key: CellKey) -> Result<(), GraphError> {
        if self.cells.contains_key(key) {
            Ok(())
        } else {
            Err(GraphError::CellNotFound(key))
        }
    }

    fn position_of(&self, key: CellKey) -> Coord {
        self.cells.get(key).map(|c| c.position).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Neighbours
    // -----------------------------------------------------------------------

    pub fn neighbor(&self, key: CellKey, dir: Direction) -> Result<Option<CellKey>, GraphError> {
        let (slot, _) = slots(dir)?;
        let cell = self.cells.get(key).ok_or(GraphError::CellNotFound(key))?;
        Ok(cell.neighbors[slot])
    }

    /// Link `a` to `b` in direction `dir` and `b` back to `a`. Previous
    /// partners on either side are unlinked first.
    pub fn set_neighbor(&mut self, a: CellKey, dir: Direction, b: CellKey) -> Result<(), GraphError> {
        let (slot, back) = slots(dir)?;
        self.require(a)?;
        self.require(b)?;
        self.unset_neighbor(a, dir)?;
        self.unset_neighbor(b, dir.opposite())?;
        self.cells[a].neighbors[slot] = Some(b);
        self.cells[b].neighbors[back] = Some(a);
        Ok(())
    }

    /// Unlink `a` from its neighbour in `dir`, on both sides. Returns the
    /// former neighbour.
    pub fn unset_neighbor(&mut self, a: CellKey, dir: Direction) -> Result<Option<CellKey>, GraphError> {
        let (slot, back) = slots(dir)?;
        let cell = self.cells.get_mut(a).ok_or(GraphError::CellNotFound(a))?;
        let old = cell.neighbors[slot].take();
        if let Some(other) = old.and_then(|o| self.cells.get_mut(o)) {
            if other.neighbors[back] == Some(a) {
                other.neighbors[back] = None;
            }
        }
        Ok(old)
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    /// Wire `a` to `b` under `use_`. An existing wire with the same use is
    /// removed first and its old target returned.
    pub fn add_connection(
        &mut self,
        a: CellKey,
        use_: ConnectionUse,
        b: CellKey,
    ) -> Result<Option<CellKey>, GraphError> {
        self.require(a)?;
        self.require(b)?;
        let replaced = self.remove_connection(a, &use_)?;
        self.cells[a].connections.insert(use_, b);
        *self.cells[b].inverse.entry(a).or_insert(0) += 1;
        Ok(replaced)
    }

    /// Remove the wire `use_` of `a`. Returns its target if it existed.
    pub fn remove_connection(&mut self, a: CellKey, use_: &ConnectionUse) -> Result<Option<CellKey>, GraphError> {
        let cell = self.cells.get_mut(a).ok_or(GraphError::CellNotFound(a))?;
        let Some(target) = cell.connections.remove(use_) else {
            return Ok(None);
        };
        self.release_inverse(target, a);
        Ok(Some(target))
    }

    /// Rename a wire without changing its target. Inverse counts are
    /// untouched unless `new` already named another wire, which is dropped.
    pub fn change_connection_use(
        &mut self,
        a: CellKey,
        old: &ConnectionUse,
        new: ConnectionUse,
    ) -> Result<bool, GraphError> {
        let cell = self.cells.get_mut(a).ok_or(GraphError::CellNotFound(a))?;
        if *old == new {
            return Ok(cell.connections.contains_key(old));
        }
        let Some(target) = cell.connections.remove(old) else {
            return Ok(false);
        };
        if let Some(previous) = cell.connections.insert(new, target) {
            self.release_inverse(previous, a);
        }
        Ok(true)
    }

    fn release_inverse(&mut self, target: CellKey, source: CellKey) {
        let Some(cell) = self.cells.get_mut(target) else {
            return;
        };
        if let Some(count) = cell.inverse.get_mut(&source) {
            *count -= 1;
            if *count == 0 {
                cell.inverse.remove(&source);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Cell lifetime
    // -----------------------------------------------------------------------

    /// Sever every relation of `key` and drop it from the arena. The caller
    /// removes the key from `rows`.
    pub(crate) fn destroy_cell(&mut self, key: CellKey) -> Result<Vec<SeveredConnection>, GraphError> {
        let cell = self.cells.get(key).ok_or(GraphError::CellNotFound(key))?;
        let outbound: Vec<(ConnectionUse, CellKey)> =
            cell.connections.iter().map(|(u, t)| (u.clone(), *t)).collect();
        let inbound: Vec<CellKey> = cell.inverse.keys().copied().filter(|s| *s != key).collect();
        let here = cell.position;

        let mut severed = Vec::new();
        for (use_, target) in outbound {
            self.remove_connection(key, &use_)?;
            severed.push(SeveredConnection {
                source: here,
                connection: use_,
                target: self.position_of(target),
            });
        }
        for source in inbound {
            let uses: Vec<ConnectionUse> = self.cells[source]
                .connections
                .iter()
                .filter(|(_, t)| **t == key)
                .map(|(u, _)| u.clone())
                .collect();
            for use_ in uses {
                self.remove_connection(source, &use_)?;
                severed.push(SeveredConnection {
                    source: self.position_of(source),
                    connection: use_,
                    target: here,
                });
            }
        }
        for dir in Direction::CARDINALS {
            self.unset_neighbor(key, dir)?;
        }
        self.cells.remove(key);
        Ok(severed)
    }

    /// Give `key` a new position and drag the cargo centred on it along.
    /// Neighbour keys are left alone.
    pub(crate) fn move_cell(&mut self, key: CellKey, to: Coord, cargo: &mut CargoPool) -> Result<(), GraphError> {
        let cell = self.cells.get_mut(key).ok_or(GraphError::CellNotFound(key))?;
        let delta = (to - cell.position).to_f();
        cell.position = to;
        for id in cell.centered() {
            if let Some(c) = cargo.get_mut(id) {
                c.position = c.position + delta;
            }
        }
        Ok(())
    }

    fn blank(&mut self, x: u32, y: u32) -> CellKey {
        self.cells
            .insert(GridCell::new(PartId::EMPTY, Coord::new(x as i32, y as i32)))
    }

    // -----------------------------------------------------------------------
    // Structural edits
    // -----------------------------------------------------------------------

    /// Insert a blank row at `k`. Rows at or below `k` shift down by one.
    pub fn insert_row(&mut self, k: u32, cargo: &mut CargoPool) -> Result<(), GraphError> {
        let Size { width, height } = self.size;
        if k > height {
            return Err(GraphError::OutOfBounds { index: k, len: height });
        }
        let grown = Size::new(width, height.saturating_add(1));
        if !size_fits(grown) {
            return Err(GraphError::TooLarge(grown));
        }
        for y in (k..height).rev() {
            for x in 0..width {
                let key = self.rows[y as usize][x as usize];
                self.move_cell(key, Coord::new(x as i32, y as i32 + 1), cargo)?;
            }
        }
        let row: Vec<CellKey> = (0..width).map(|x| self.blank(x, k)).collect();
        self.rows.insert(k as usize, row);
        self.size.height += 1;

        let k = k as usize;
        for x in 0..width as usize {
            let key = self.rows[k][x];
            if x > 0 {
                let west = self.rows[k][x - 1];
                self.set_neighbor(key, Direction::West, west)?;
            }
            if k > 0 {
                let north = self.rows[k - 1][x];
                self.set_neighbor(key, Direction::North, north)?;
            }
            if let Some(&south) = self.rows.get(k + 1).and_then(|r| r.get(x)) {
                self.set_neighbor(key, Direction::South, south)?;
            }
        }
        tracing::trace!(grid = %self.kind, row = k, "row inserted");
        Ok(())
    }

    /// Remove row `k`. Rows below it shift up and close the gap.
    pub fn remove_row(&mut self, k: u32, cargo: &mut CargoPool) -> Result<Vec<SeveredConnection>, GraphError> {
        let height = self.size.height;
        if k >= height {
            return Err(GraphError::OutOfBounds { index: k, len: height });
        }
        let row = self.rows.remove(k as usize);
        let mut severed = Vec::new();
        for key in row {
            severed.extend(self.destroy_cell(key)?);
        }
        self.size.height -= 1;
        for y in k..self.size.height {
            for x in 0..self.size.width {
                let key = self.rows[y as usize][x as usize];
                self.move_cell(key, Coord::new(x as i32, y as i32), cargo)?;
            }
        }
        let k = k as usize;
        if k > 0 && k < self.rows.len() {
            for x in 0..self.size.width as usize {
                let (north, south) = (self.rows[k - 1][x], self.rows[k][x]);
                self.set_neighbor(north, Direction::South, south)?;
            }
        }
        tracing::trace!(grid = %self.kind, row = k, severed = severed.len(), "row removed");
        Ok(severed)
    }

    /// Insert a blank column at `k`. Columns at or right of `k` shift right.
    pub fn insert_column(&mut self, k: u32, cargo: &mut CargoPool) -> Result<(), GraphError> {
        let Size { width, height } = self.size;
        if k > width {
            return Err(GraphError::OutOfBounds { index: k, len: width });
        }
        let grown = Size::new(width.saturating_add(1), height);
        if !size_fits(grown) {
            return Err(GraphError::TooLarge(grown));
        }
        for y in 0..height {
            for x in (k..width).rev() {
                let key = self.rows[y as usize][x as usize];
                self.move_cell(key, Coord::new(x as i32 + 1, y as i32), cargo)?;
            }
            let key = self.blank(k, y);
            self.rows[y as usize].insert(k as usize, key);
        }
        self.size.width += 1;

        let k = k as usize;
        for y in 0..height as usize {
            let key = self.rows[y][k];
            if y > 0 {
                let north = self.rows[y - 1][k];
                self.set_neighbor(key, Direction::North, north)?;
            }
            if k > 0 {
                let west = self.rows[y][k - 1];
                self.set_neighbor(key, Direction::West, west)?;
            }
            if let Some(&east) = self.rows[y].get(k + 1) {
                self.set_neighbor(key, Direction::East, east)?;
            }
        }
        tracing::trace!(grid = %self.kind, column = k, "column inserted");
        Ok(())
    }

    /// Remove column `k`. Columns right of it shift left and close the gap.
    pub fn remove_column(&mut self, k: u32, cargo: &mut CargoPool) -> Result<Vec<SeveredConnection>, GraphError> {
        let width = self.size.width;
        if k >= width {
            return Err(GraphError::OutOfBounds { index: k, len: width });
        }
        let column: Vec<CellKey> = self.rows.iter_mut().map(|r| r.remove(k as usize)).collect();
        let mut severed = Vec::new();
        for key in column {
            severed.extend(self.destroy_cell(key)?);
        }
        self.size.width -= 1;
        for y in 0..self.size.height {
            for x in k..self.size.width {
                let key = self.rows[y as usize][x as usize];
                self.move_cell(key, Coord::new(x as i32, y as i32), cargo)?;
            }
        }
        let k = k as usize;
        if k > 0 && k < self.size.width as usize {
            for y in 0..self.size.height as usize {
                let (west, east) = (self.rows[y][k - 1], self.rows[y][k]);
                self.set_neighbor(west, Direction::East, east)?;
            }
        }
        tracing::trace!(grid = %self.kind, column = k, severed = severed.len(), "column removed");
        Ok(severed)
    }

    /// Grow or shrink at the far edges until the grid has `size`.
    pub fn resize(&mut self, size: Size, cargo: &mut CargoPool) -> Result<Vec<SeveredConnection>, GraphError> {
        if !size_fits(size) {
            return Err(GraphError::TooLarge(size));
        }
        let mut severed = Vec::new();
        while self.size.width > size.width {
            severed.extend(self.remove_column(self.size.width - 1, cargo)?);
        }
        while self.size.height > size.height {
            severed.extend(self.remove_row(self.size.height - 1, cargo)?);
        }
        while self.size.width < size.width {
            self.insert_column(self.size.width, cargo)?;
        }
        while self.size.height < size.height {
            self.insert_row(self.size.height, cargo)?;
        }
        Ok(severed)
    }

    /// Check every structural invariant. Used by tests and after loads.
    pub fn validate(&self) -> Result<(), GraphError> {
        let fail = |msg: String| Err(GraphError::Inconsistent(msg));
        if self.rows.len() != self.size.height as usize {
            return fail(format!("{} rows for height {}", self.rows.len(), self.size.height));
        }
        if self.cells.len() != self.size.area() {
            return fail(format!("{} cells for size {}", self.cells.len(), self.size));
        }
        for (y, row) in self.rows.iter().enumerate() {
            if row.len() != self.size.width as usize {
                return fail(format!("row {y} has {} cells", row.len()));
            }
            for (x, &key) in row.iter().enumerate() {
                let at = Coord::new(x as i32, y as i32);
                let Some(cell) = self.cells.get(key) else {
                    return fail(format!("dangling key at {at}"));
                };
                if cell.position != at {
                    return fail(format!("cell at {at} believes it is at {}", cell.position));
                }
                for dir in Direction::CARDINALS {
                    let expected = self.key_at(at.step(dir));
                    if cell.neighbor(dir) != expected {
                        return fail(format!("{at} has wrong {dir} neighbour"));
                    }
                    if let Some(n) = expected {
                        if self.cells[n].neighbor(dir.opposite()) != Some(key) {
                            return fail(format!("{at} {dir} link is one-sided"));
                        }
                    }
                }
                for (source, &count) in &cell.inverse {
                    let actual = self
                        .cells
                        .get(*source)
                        .map(|s| s.connections.values().filter(|t| **t == key).count())
                        .unwrap_or(0);
                    if actual as u32 != count {
                        return fail(format!("{at} inverse count {count}, found {actual} wires"));
                    }
                }
                for target in cell.connections.values() {
                    if !self.cells.get(*target).is_some_and(|t| t.inverse.contains_key(&key)) {
                        return fail(format!("{at} wire target lacks inverse entry"));
                    }
                }
            }
        }
        Ok(())
    }
}
