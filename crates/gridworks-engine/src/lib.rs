//! Gridworks Engine -- drives a [`gridworks_core`] model tick by tick.
//!
//! A [`simulation::Simulation`] owns the model, the part registry and the
//! attached participants. Its automaton runs on a driver thread and fans
//! each tick out over a fixed worker pool.
//!
//! # Tick Pipeline
//!
//! 1. **Process request** -- Participants queued for access go first.
//! 2. **Cycle and move** -- Workers run the `cycle` and `move` hooks over a
//!    strided share of the cells, each into its own context.
//! 3. **Commit and draw** -- Contexts are committed in worker order, cargo
//!    is settled and events reach the participants.
//! 4. **Clean** -- The tick counter advances and `on_cycle` fires.
//!
//! # Access Pattern
//!
//! Participants never touch the model during a tick:
//!
//! ```rust,ignore
//! let mut tx = sim.access();           // waits for the tick boundary
//! tx.regulate(cell, STATE, true.into());
//! tx.commit();                         // or drop; rollback() discards
//! ```
//!
//! # Key Types
//!
//! - [`simulation::Simulation`] -- Embedding handle: parts, participants,
//!   control and persistence.
//! - [`automaton::Automaton`] -- Driver thread and its state machine.
//! - [`transaction::Transaction`] -- Exclusive access between ticks.
//! - [`participant::Participant`] -- Callback contract for external actors.
//! - [`config::SimulationConfig`] -- Worker count, pacing and initial model.
//! - [`tick::TickProfile`] -- Per-phase timing of the last tick.

pub mod automaton;
pub mod config;
pub mod gate;
pub mod participant;
pub mod shared;
pub mod simulation;
pub mod tick;
pub mod transaction;

pub use automaton::AutomatonState;
pub use config::{IterationMode, SimulationConfig};
pub use participant::Participant;
pub use simulation::{Simulation, SimulationError};
pub use tick::TickProfile;
pub use transaction::Transaction;
