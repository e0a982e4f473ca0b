//! Runs a small model on the engine and prints the saved result.
//!
//! A clock blinks two lamps while crates circle a belt loop.
//!
//! ```text
//! gridworks-demo [config.toml] [out.grid]
//! ```
//!
//! Logging goes through `RUST_LOG` (default `info`).

mod parts;

use gridworks_core::geometry::{Coord, CoordF, Direction, Size};
use gridworks_core::id::{CargoId, CellHandle, CellRef, ConnectionUse, GridPos};
use gridworks_core::image::Image;
use gridworks_core::model::ModelInfo;
use gridworks_core::part::DelegateError;
use gridworks_engine::{AutomatonState, Participant, Simulation, SimulationConfig, Transaction};
use parts::DemoParts;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const TICKS: u64 = 40;
const MIN_SIZE: Size = Size::new(8, 4);

/// Belt loop: position and direction of each segment.
const LOOP: [(i32, i32, Direction); 10] = [
    (2, 2, Direction::East),
    (3, 2, Direction::East),
    (4, 2, Direction::East),
    (5, 2, Direction::East),
    (6, 2, Direction::South),
    (6, 3, Direction::West),
    (5, 3, Direction::West),
    (4, 3, Direction::West),
    (3, 3, Direction::West),
    (2, 3, Direction::North),
];

// ===========================================================================
// Logging participant
// ===========================================================================

#[derive(Debug, Default)]
struct Logger {
    redraws: usize,
    moves: usize,
}

impl Participant for Logger {
    fn name(&self) -> &str {
        "logger"
    }

    fn on_attach(&mut self) {
        tracing::info!("logger attached");
    }

    fn on_cycle(&mut self, tick: u64) {
        if tick % 10 == 0 {
            tracing::info!(tick, redraws = self.redraws, moves = self.moves, "progress");
        }
    }

    fn on_run(&mut self) {
        tracing::info!("running");
    }

    fn on_stop(&mut self) {
        tracing::info!("stopped");
    }

    fn on_message(&mut self, text: &str) {
        tracing::info!(%text, "message");
    }

    fn on_exception(&mut self, error: &DelegateError) {
        tracing::warn!(part = %error.part, hook = %error.hook, "{}", error.message);
    }

    fn on_redraw(&mut self, cell: CellHandle, _image: &Image) {
        self.redraws += 1;
        tracing::trace!(?cell, "redraw");
    }

    fn on_cargo_moved(&mut self, cargo: CargoId, to: CoordF) {
        self.moves += 1;
        tracing::debug!(?cargo, %to, "cargo moved");
    }

    fn on_detach(&mut self) {
        tracing::info!(redraws = self.redraws, moves = self.moves, "logger detached");
    }
}

// ===========================================================================
// Model layout
// ===========================================================================

fn locate(tx: &Transaction<'_>, x: i32, y: i32) -> Result<CellRef, String> {
    tx.model()
        .world
        .locate(GridPos::model(x, y).into())
        .ok_or_else(|| format!("no model cell at {x},{y}"))
}

fn build(sim: &Simulation, ids: &DemoParts) -> Result<(), Box<dyn Error>> {
    let mut tx = sim.access();
    let clock = locate(&tx, 0, 0)?;
    tx.place_part(clock, ids.clock);
    for x in [2, 3] {
        let lamp = locate(&tx, x, 0)?;
        tx.place_part(lamp, ids.lamp);
    }
    let mut belts = Vec::with_capacity(LOOP.len());
    for (x, y, _) in LOOP {
        let belt = locate(&tx, x, y)?;
        tx.place_part(belt, ids.belt);
        belts.push(belt);
    }
    tx.update_info(ModelInfo {
        title: "Blinker and loop".to_string(),
        author: "gridworks-demo".to_string(),
        version: "1".to_string(),
        description: "a clock driving two lamps next to a belt loop".to_string(),
        editable: true,
    });
    tx.commit();

    // Wiring and settings need the parts in place.
    let mut tx = sim.access();
    let mut proxy = tx.cell(clock);
    proxy.connect(ConnectionUse::indexed("OUT", 0), Coord::new(2, 0));
    proxy.connect(ConnectionUse::indexed("OUT", 1), Coord::new(3, 0));
    for (belt, (_, _, dir)) in belts.iter().zip(LOOP) {
        tx.regulate(*belt, parts::DIR, dir.into());
    }
    tx.regulate(clock, parts::PERIOD, 3i64.into());
    for belt in [belts[0], belts[5]] {
        tx.press(belt, CoordF::default());
    }
    let report = tx.commit();
    tracing::info!(crates = report.spawned.len(), part = ids.crate_.0, "model built");
    Ok(())
}

// ===========================================================================
// Entry point
// ===========================================================================

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => SimulationConfig::from_file(Path::new(&path))?,
        None => SimulationConfig {
            min_interval_ms: 20,
            ..SimulationConfig::default()
        },
    };
    let out = args.next();
    config.model_size = Size::new(
        config.model_size.width.max(MIN_SIZE.width),
        config.model_size.height.max(MIN_SIZE.height),
    );

    let (parts, ids) = parts::registry()?;
    let sim = Simulation::new(config, parts)?;
    sim.attach(Box::new(Logger::default()))?;
    build(&sim, &ids)?;

    sim.commence(AutomatonState::Run);
    if !sim.wait_for_tick(TICKS, Duration::from_secs(60)) {
        tracing::warn!(tick = sim.tick(), "gave up waiting for {TICKS} ticks");
    }
    sim.stop();
    sim.wait_for_state(AutomatonState::Stop, Duration::from_secs(5));

    if let Some(profile) = sim.last_profile() {
        let (phase, time) = profile.bottleneck_phase();
        tracing::info!(
            tick = profile.tick,
            workers = profile.workers,
            cells = profile.cells,
            total_us = profile.total.as_micros() as u64,
            bottleneck = phase,
            bottleneck_us = time.as_micros() as u64,
            "last tick"
        );
    }

    match out {
        Some(path) => {
            sim.store_file(Path::new(&path))?;
            tracing::info!(%path, "model stored");
        }
        None => print!("{}", sim.store_string()),
    }
    sim.shutdown();
    Ok(())
}
