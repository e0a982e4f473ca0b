use crate::geometry::Coord;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::str::FromStr;

new_key_type! {
    /// Identifies a grid cell inside its grid's arena. Stable across resizes.
    pub struct CellKey;

    /// Identifies a committed cargo cell. Global across both grids.
    pub struct CargoId;
}

/// Identifies a registered part. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartId(pub u32);

impl PartId {
    /// The part every registry starts with and removed parts fall back to.
    pub const EMPTY: PartId = PartId(0);
    /// The part of the read-only sentinel cell.
    pub const INVALID: PartId = PartId(u32::MAX);
}

/// Identifies a property declared by a part schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub u32);

/// A pending cargo ID returned from a context spawn. Resolves to a
/// `CargoId` on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingCargoId(pub u64);

/// Which of the world's two grids a cell lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GridKind {
    /// The simulated model.
    Model,
    /// The palette of parts offered to the user.
    Bank,
}

impl GridKind {
    pub const ALL: [GridKind; 2] = [GridKind::Model, GridKind::Bank];

    pub fn name(&self) -> &'static str {
        match self {
            GridKind::Model => "model",
            GridKind::Bank => "bank",
        }
    }

    pub fn from_name(name: &str) -> Option<GridKind> {
        match name {
            "model" => Some(GridKind::Model),
            "bank" => Some(GridKind::Bank),
            _ => None,
        }
    }
}

impl fmt::Display for GridKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A positional grid address: grid category plus coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub grid: GridKind,
    pub at: Coord,
}

impl GridPos {
    pub fn new(grid: GridKind, x: i32, y: i32) -> Self {
        Self {
            grid,
            at: Coord::new(x, y),
        }
    }

    pub fn model(x: i32, y: i32) -> Self {
        Self::new(GridKind::Model, x, y)
    }

    pub fn bank(x: i32, y: i32) -> Self {
        Self::new(GridKind::Bank, x, y)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.grid, self.at)
    }
}

/// User-facing cell address. Grid cells are addressed by position, cargo by
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CellHandle {
    Grid(GridPos),
    Cargo(CargoId),
}

impl From<GridPos> for CellHandle {
    fn from(pos: GridPos) -> Self {
        CellHandle::Grid(pos)
    }
}

impl From<CargoId> for CellHandle {
    fn from(id: CargoId) -> Self {
        CellHandle::Cargo(id)
    }
}

/// Stable reference to a cell, independent of its current position.
///
/// Contexts and the process tab record `CellRef`s so that structural edits
/// applied earlier in the same commit cannot redirect them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CellRef {
    Grid { grid: GridKind, key: CellKey },
    Cargo(CargoId),
    /// Cargo spawned in a context that has not been committed yet.
    PendingCargo(PendingCargoId),
}

impl CellRef {
    pub fn grid(grid: GridKind, key: CellKey) -> Self {
        CellRef::Grid { grid, key }
    }

    pub fn is_cargo(&self) -> bool {
        matches!(self, CellRef::Cargo(_) | CellRef::PendingCargo(_))
    }
}

// ---------------------------------------------------------------------------
// Connection uses
// ---------------------------------------------------------------------------

/// The name of one end of a point-to-point wire, e.g. `PIN[4]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionUse {
    pub name: String,
    pub index: u32,
}

impl ConnectionUse {
    pub fn new(name: impl Into<String>) -> Self {
        Self::indexed(name, 0)
    }

    pub fn indexed(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl fmt::Display for ConnectionUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.index)
    }
}

/// Error parsing a [`ConnectionUse`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed connection use: {0:?}")]
pub struct ConnectionUseParseError(pub String);

impl FromStr for ConnectionUse {
    type Err = ConnectionUseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ConnectionUseParseError(s.to_string());
        let (name, index) = match s.split_once('[') {
            Some((name, rest)) => {
                let digits = rest.strip_suffix(']').ok_or_else(err)?;
                (name, digits.parse::<u32>().map_err(|_| err())?)
            }
            None => (s, 0),
        };
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(err());
        }
        Ok(ConnectionUse::indexed(name, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_use_display_and_parse() {
        let pin = ConnectionUse::indexed("PIN", 4);
        assert_eq!(pin.to_string(), "PIN[4]");
        assert_eq!("PIN[4]".parse::<ConnectionUse>(), Ok(pin));
        assert_eq!("OUT".parse::<ConnectionUse>(), Ok(ConnectionUse::new("OUT")));
    }

    #[test]
    fn connection_use_rejects_garbage() {
        assert!("PIN[".parse::<ConnectionUse>().is_err());
        assert!("PIN[x]".parse::<ConnectionUse>().is_err());
        assert!("".parse::<ConnectionUse>().is_err());
        assert!("a b".parse::<ConnectionUse>().is_err());
    }

    #[test]
    fn grid_kind_names_round_trip() {
        for kind in GridKind::ALL {
            assert_eq!(GridKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(GridKind::from_name("attic"), None);
    }

    #[test]
    fn cell_refs_order_grid_before_cargo() {
        let mut keys: slotmap::SlotMap<CellKey, ()> = slotmap::SlotMap::with_key();
        let mut cargo: slotmap::SlotMap<CargoId, ()> = slotmap::SlotMap::with_key();
        let g = CellRef::grid(GridKind::Model, keys.insert(()));
        let c = CellRef::Cargo(cargo.insert(()));
        assert!(g < c);
        assert!(c.is_cargo());
        assert!(!g.is_cargo());
    }
}
