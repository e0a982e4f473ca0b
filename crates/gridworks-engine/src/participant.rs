//! External actors observing and driving a simulation.
//!
//! A participant is notified of everything that happens to the model through
//! the `on_*` callbacks and may take exclusive access between ticks with
//! [`crate::simulation::Simulation::access`]. Callbacks run while the
//! simulation is held, so a callback must not call `access` itself.

use gridworks_core::event::Event;
use gridworks_core::geometry::{Coord, CoordF, Size};
use gridworks_core::id::{CargoId, CellHandle, ConnectionUse, GridKind, PartId};
use gridworks_core::image::Image;
use gridworks_core::model::ModelInfo;
use gridworks_core::part::DelegateError;

/// Receiver of simulation notifications. Every callback defaults to doing
/// nothing.
#[allow(unused_variables)]
pub trait Participant: Send {
    /// Unique name of this participant within one simulation.
    fn name(&self) -> &str;

    /// First callback after attaching.
    fn on_attach(&mut self) {}
    /// A tick finished; `tick` is the number of ticks run so far.
    fn on_cycle(&mut self, tick: u64) {}
    fn on_part_included(&mut self, part: PartId, name: &str) {}
    fn on_part_removed(&mut self, part: PartId, name: &str) {}
    fn on_resize_grid(&mut self, grid: GridKind, size: Size) {}
    fn on_model_loaded(&mut self, info: &ModelInfo) {}
    fn on_info_updated(&mut self, info: &ModelInfo) {}
    fn on_run(&mut self) {}
    fn on_step(&mut self) {}
    fn on_stop(&mut self) {}
    fn on_message(&mut self, text: &str) {}
    fn on_exception(&mut self, error: &DelegateError) {}
    fn on_selection_update(&mut self, selection: &[CellHandle]) {}
    fn on_redraw(&mut self, cell: CellHandle, image: &Image) {}
    fn on_connection_added(&mut self, grid: GridKind, source: Coord, connection: &ConnectionUse, target: Coord) {}
    fn on_connection_removed(&mut self, grid: GridKind, source: Coord, connection: &ConnectionUse, target: Coord) {}
    fn on_cargo_spawned(&mut self, cargo: CargoId, grid: GridKind, at: CoordF) {}
    fn on_cargo_moved(&mut self, cargo: CargoId, to: CoordF) {}
    fn on_cargo_destroyed(&mut self, cargo: CargoId) {}
    /// A participant transaction was committed.
    fn on_commit(&mut self, tick: u64) {}
    /// Last callback before the participant is handed back.
    fn on_detach(&mut self) {}
}

/// Route one committed event to the matching callback.
pub fn deliver(participant: &mut dyn Participant, event: &Event) {
    match event {
        Event::GridResized { grid, size } => participant.on_resize_grid(*grid, *size),
        Event::ConnectionAdded {
            grid,
            source,
            connection,
            target,
        } => participant.on_connection_added(*grid, *source, connection, *target),
        Event::ConnectionRemoved {
            grid,
            source,
            connection,
            target,
        } => participant.on_connection_removed(*grid, *source, connection, *target),
        Event::CargoSpawned { cargo, grid, at } => participant.on_cargo_spawned(*cargo, *grid, *at),
        Event::CargoMoved { cargo, to } => participant.on_cargo_moved(*cargo, *to),
        Event::CargoDestroyed { cargo } => participant.on_cargo_destroyed(*cargo),
        Event::Redraw { cell, image } => participant.on_redraw(*cell, image),
        Event::InfoUpdated { info } => participant.on_info_updated(info),
        Event::SelectionUpdated { selection } => participant.on_selection_update(selection),
        Event::Message { text } => participant.on_message(text),
        Event::Exception { error } => participant.on_exception(error),
    }
}

// ===========================================================================
// ParticipantSet
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParticipantError {
    #[error("a participant named {0:?} is already attached")]
    Duplicate(String),
    #[error("no participant named {0:?} is attached")]
    Unknown(String),
}

/// Attached participants in attach order.
#[derive(Default)]
pub struct ParticipantSet {
    members: Vec<Box<dyn Participant>>,
}

impl std::fmt::Debug for ParticipantSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.members.iter().map(|p| p.name())).finish()
    }
}

impl ParticipantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `participant` and send it `on_attach`.
    pub fn attach(&mut self, mut participant: Box<dyn Participant>) -> Result<(), ParticipantError> {
        if self.contains(participant.name()) {
            return Err(ParticipantError::Duplicate(participant.name().to_string()));
        }
        participant.on_attach();
        tracing::info!(participant = participant.name(), "participant attached");
        self.members.push(participant);
        Ok(())
    }

    /// Send `on_detach` and hand the participant back.
    pub fn detach(&mut self, name: &str) -> Result<Box<dyn Participant>, ParticipantError> {
        let index = self
            .members
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| ParticipantError::Unknown(name.to_string()))?;
        let mut participant = self.members.remove(index);
        participant.on_detach();
        tracing::info!(participant = name, "participant detached");
        Ok(participant)
    }

    /// Detach everyone, last attached first.
    pub fn detach_all(&mut self) -> Vec<Box<dyn Participant>> {
        let mut out = Vec::with_capacity(self.members.len());
        while let Some(mut participant) = self.members.pop() {
            participant.on_detach();
            out.push(participant);
        }
        out
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.members.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Call `f` on every participant in attach order.
    pub fn broadcast(&mut self, mut f: impl FnMut(&mut dyn Participant)) {
        for participant in &mut self.members {
            f(participant.as_mut());
        }
    }

    /// Deliver `events` in order to every participant.
    pub fn deliver(&mut self, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        for participant in &mut self.members {
            for event in events {
                deliver(participant.as_mut(), event);
            }
        }
    }
}
