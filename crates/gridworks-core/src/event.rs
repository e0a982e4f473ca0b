//! Events produced when a context is committed.
//!
//! A commit returns its events in application order inside a
//! [`crate::context::CommitReport`]. The engine hands them to every attached
//! participant once the world is consistent again; nothing is delivered while
//! a commit is half done.

use crate::geometry::{Coord, CoordF, Size};
use crate::id::{CargoId, CellHandle, ConnectionUse, GridKind};
use crate::image::Image;
use crate::model::ModelInfo;
use crate::part::DelegateError;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // -- Structure --
    GridResized {
        grid: GridKind,
        size: Size,
    },
    ConnectionAdded {
        grid: GridKind,
        source: Coord,
        connection: ConnectionUse,
        target: Coord,
    },
    ConnectionRemoved {
        grid: GridKind,
        source: Coord,
        connection: ConnectionUse,
        target: Coord,
    },

    // -- Cargo --
    CargoSpawned {
        cargo: CargoId,
        grid: GridKind,
        at: CoordF,
    },
    CargoMoved {
        cargo: CargoId,
        to: CoordF,
    },
    CargoDestroyed {
        cargo: CargoId,
    },

    // -- Presentation --
    Redraw {
        cell: CellHandle,
        image: Image,
    },
    InfoUpdated {
        info: ModelInfo,
    },
    SelectionUpdated {
        selection: Vec<CellHandle>,
    },
    Message {
        text: String,
    },
    Exception {
        error: DelegateError,
    },
}

/// Discriminant tag for event types, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    GridResized,
    ConnectionAdded,
    ConnectionRemoved,
    CargoSpawned,
    CargoMoved,
    CargoDestroyed,
    Redraw,
    InfoUpdated,
    SelectionUpdated,
    Message,
    Exception,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::GridResized { .. } => EventKind::GridResized,
            Event::ConnectionAdded { .. } => EventKind::ConnectionAdded,
            Event::ConnectionRemoved { .. } => EventKind::ConnectionRemoved,
            Event::CargoSpawned { .. } => EventKind::CargoSpawned,
            Event::CargoMoved { .. } => EventKind::CargoMoved,
            Event::CargoDestroyed { .. } => EventKind::CargoDestroyed,
            Event::Redraw { .. } => EventKind::Redraw,
            Event::InfoUpdated { .. } => EventKind::InfoUpdated,
            Event::SelectionUpdated { .. } => EventKind::SelectionUpdated,
            Event::Message { .. } => EventKind::Message,
            Event::Exception { .. } => EventKind::Exception,
        }
    }
}
