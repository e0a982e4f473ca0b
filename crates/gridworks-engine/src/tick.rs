//! One tick: cycle and move on the worker pool, then commit.
//!
//! Work is a flat list of cells. Worker `i` of `n` takes items
//! `i, i + n, i + 2n, ...` and records into its own [`Context`]. The
//! driver thread is worker 0; the end of the rayon scope is the round
//! barrier. Contexts are committed in worker-index order, so a tick's
//! outcome does not depend on thread timing.

use crate::config::IterationMode;
use crate::shared::Core;
use gridworks_core::context::{CommitReport, Context};
use gridworks_core::id::{CellRef, GridKind};
use gridworks_core::part::{Hook, PartRegistry};
use gridworks_core::process_tab::{ProcessFlags, ProcessTab};
use gridworks_core::world::World;
use rayon::ThreadPool;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

// ===========================================================================
// Profile
// ===========================================================================

/// Per-phase timing of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickProfile {
    pub tick: u64,
    /// Time spent letting queued participants through first.
    pub process_request: Duration,
    pub cycle_and_move: Duration,
    pub commit_and_draw: Duration,
    pub clean: Duration,
    pub total: Duration,
    /// Cells visited.
    pub cells: usize,
    pub workers: usize,
}

impl TickProfile {
    /// Returns the name and duration of the slowest phase.
    pub fn bottleneck_phase(&self) -> (&'static str, Duration) {
        let phases = [
            ("process_request", self.process_request),
            ("cycle_and_move", self.cycle_and_move),
            ("commit_and_draw", self.commit_and_draw),
            ("clean", self.clean),
        ];
        phases
            .into_iter()
            .max_by_key(|(_, d)| *d)
            .unwrap_or(("process_request", Duration::ZERO))
    }
}

// ===========================================================================
// Work selection
// ===========================================================================

/// A cell to visit and the hooks to run on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub cell: CellRef,
    pub flags: ProcessFlags,
}

fn in_model(world: &World, cell: CellRef) -> bool {
    match cell {
        CellRef::Grid { grid, .. } => grid == GridKind::Model,
        CellRef::Cargo(id) => world.cargo_cell(id).is_some_and(|c| c.grid() == GridKind::Model),
        CellRef::PendingCargo(_) => false,
    }
}

/// The cells a tick visits, in a stable order. The bank is never run.
pub fn select_work(world: &World, process: &ProcessTab, mode: IterationMode) -> Vec<WorkItem> {
    match mode {
        IterationMode::FullScan => {
            let grid = world.grid(GridKind::Model);
            grid.keys()
                .map(|key| CellRef::grid(GridKind::Model, key))
                .chain(world.cargo().keys().map(CellRef::Cargo))
                .filter(|cell| in_model(world, *cell))
                .map(|cell| WorkItem {
                    cell,
                    flags: ProcessFlags::CYCLE | ProcessFlags::MOVE,
                })
                .collect()
        }
        IterationMode::ActiveSet => {
            let active: BTreeSet<CellRef> = process.cycling().chain(process.moving()).collect();
            active
                .into_iter()
                .filter(|cell| world.contains(*cell) && in_model(world, *cell))
                .map(|cell| WorkItem {
                    cell,
                    flags: process.flags(cell),
                })
                .collect()
        }
    }
}

/// Indices of `len` items that worker `worker` of `workers` takes.
pub fn stride(len: usize, worker: usize, workers: usize) -> impl Iterator<Item = usize> {
    (worker..len).step_by(workers.max(1))
}

// ===========================================================================
// Cycle and move
// ===========================================================================

fn run_slice(world: &World, parts: &PartRegistry, items: &[WorkItem], worker: usize, workers: usize, ctx: &mut Context) {
    let mut visited = 0usize;
    for index in stride(items.len(), worker, workers) {
        let item = items[index];
        if item.flags.contains(ProcessFlags::CYCLE) {
            ctx.dispatch(world, parts, item.cell, Hook::Cycle, |b, c| b.cycle(c));
        }
        if item.flags.contains(ProcessFlags::MOVE) {
            ctx.dispatch(world, parts, item.cell, Hook::Move, |b, c| b.moving(c));
        }
        visited += 1;
    }
    tracing::trace!(worker, visited, "slice done");
}

/// Run every item's hooks, one context per worker.
pub fn cycle_and_move(
    pool: Option<&ThreadPool>,
    workers: usize,
    world: &World,
    parts: &PartRegistry,
    items: &[WorkItem],
) -> Vec<Context> {
    let workers = workers.max(1);
    let mut contexts: Vec<Context> = (0..workers).map(Context::for_worker).collect();
    match pool {
        Some(pool) if workers > 1 => {
            let (driver, rest) = contexts.split_at_mut(1);
            pool.in_place_scope(|scope| {
                for (i, ctx) in rest.iter_mut().enumerate() {
                    scope.spawn(move |_| run_slice(world, parts, items, i + 1, workers, ctx));
                }
                run_slice(world, parts, items, 0, workers, &mut driver[0]);
            });
        }
        _ => {
            for (i, ctx) in contexts.iter_mut().enumerate() {
                run_slice(world, parts, items, i, workers, ctx);
            }
        }
    }
    contexts
}

/// Run one full tick on `core`. `waited` is how long the driver stood
/// aside for participants before getting the world.
pub fn run_tick(
    core: &mut Core,
    pool: Option<&ThreadPool>,
    workers: usize,
    mode: IterationMode,
    waited: Duration,
) -> TickProfile {
    let _span = tracing::debug_span!("tick", tick = core.tick + 1).entered();
    let started = Instant::now();

    let items = select_work(&core.model.world, &core.process, mode);
    let contexts = cycle_and_move(pool, workers, &core.model.world, &core.parts, &items);
    let cycle_and_move = started.elapsed();

    let commit_start = Instant::now();
    let mut report = CommitReport::default();
    for mut ctx in contexts {
        report.absorb(ctx.commit(&mut core.model, &core.parts, &mut core.process));
    }
    report.settle(&mut core.model.world);
    core.participants.deliver(&report.events);
    let commit_and_draw = commit_start.elapsed();

    let clean_start = Instant::now();
    core.tick += 1;
    let tick = core.tick;
    core.participants.broadcast(|p| p.on_cycle(tick));
    let clean = clean_start.elapsed();

    tracing::debug!(
        tick,
        cells = items.len(),
        transited = report.transited,
        events = report.events.len(),
        "tick complete"
    );
    let profile = TickProfile {
        tick,
        process_request: waited,
        cycle_and_move,
        commit_and_draw,
        clean,
        total: waited + started.elapsed(),
        cells: items.len(),
        workers,
    };
    core.profile = Some(profile.clone());
    profile
}
