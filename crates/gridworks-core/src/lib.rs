//! Gridworks Core -- the world model of a tick-driven grid simulation.
//!
//! This crate holds everything a simulation step touches: the two grids of
//! linked cells, free-floating cargo, the dynamically typed property values,
//! part schemas with their behaviour hooks, and the transactional [`context`]
//! through which every change flows. Scheduling lives in `gridworks-engine`.
//!
//! # Double-Buffered Properties
//!
//! Every cell keeps committed values and pending values. Hooks read the
//! committed state of the previous tick and stage writes into a
//! [`context::Context`]; nothing is visible to other cells until the context
//! is committed:
//!
//! ```rust,ignore
//! let mut ctx = Context::new();
//! let mut proxy = CellProxy::new(&model.world, &parts, &mut ctx, cell);
//! let pending = proxy.spawn_cargo(crate_part, CoordF::new(0.5, 0.5));
//! let report = ctx.commit(&mut model, &parts, &mut process);
//! let cargo = report.resolve_cargo(pending).unwrap();
//! ```
//!
//! # Key Types
//!
//! - [`value::Value`] -- Tagged property value with typed accessors.
//! - [`part::Part`] -- Schema of a component kind plus its [`part::Behavior`].
//! - [`grid::Grid`] -- Rectangular arena of [`cell::GridCell`]s with
//!   neighbour links and named wires.
//! - [`world::World`] -- Model grid, bank grid and the cargo pool.
//! - [`process_tab::ProcessTab`] -- Which cells cycle and which move.
//! - [`context::Context`] -- Per-worker change buffer and commit pipeline.
//! - [`format`] -- Line-oriented text persistence.

pub mod cell;
pub mod context;
pub mod event;
pub mod format;
pub mod geometry;
pub mod grid;
pub mod id;
pub mod image;
pub mod model;
pub mod part;
pub mod process_tab;
pub mod value;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
