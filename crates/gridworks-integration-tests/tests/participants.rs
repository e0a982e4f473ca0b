//! Participants driving and observing a live simulation.
//!
//! These tests run the real driver thread and worker pool: participants see
//! callbacks in order, never observe a half-applied tick, and hear about
//! failing parts without the tick stopping.

use gridworks_core::geometry::{Coord, CoordF, Size};
use gridworks_core::id::{CellRef, ConnectionUse, GridKind, PartId, PropertyId};
use gridworks_core::part::{DelegateError, Hook, PartRegistry};
use gridworks_core::test_utils::*;
use gridworks_core::value::Value;
use gridworks_engine::config::SimulationConfig;
use gridworks_engine::{AutomatonState, Participant, Simulation, SimulationError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

// ============================================================================
// Shared helpers
// ============================================================================

/// Callback log shared between a participant and the test.
type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    name: String,
    log: Log,
    exceptions: Arc<Mutex<Vec<DelegateError>>>,
}

impl Recorder {
    fn new(name: &str) -> (Self, Log) {
        let log = Log::default();
        let recorder = Self {
            name: name.to_string(),
            log: Arc::clone(&log),
            exceptions: Arc::default(),
        };
        (recorder, log)
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl Participant for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_attach(&mut self) {
        self.push(format!("{}:attach", self.name));
    }

    fn on_cycle(&mut self, tick: u64) {
        self.push(format!("{}:cycle {tick}", self.name));
    }

    fn on_run(&mut self) {
        self.push(format!("{}:run", self.name));
    }

    fn on_step(&mut self) {
        self.push(format!("{}:step", self.name));
    }

    fn on_stop(&mut self) {
        self.push(format!("{}:stop", self.name));
    }

    fn on_exception(&mut self, error: &DelegateError) {
        self.exceptions.lock().unwrap().push(error.clone());
    }

    fn on_connection_added(&mut self, _grid: GridKind, source: Coord, connection: &ConnectionUse, target: Coord) {
        self.push(format!("{}:wire {connection} {},{} -> {},{}", self.name, source.x, source.y, target.x, target.y));
    }

    fn on_detach(&mut self) {
        self.push(format!("{}:detach", self.name));
    }
}

fn simulation(width: u32, height: u32, workers: usize) -> (Simulation, SampleParts) {
    let (parts, ids) = sample_registry();
    let config = SimulationConfig {
        workers: Some(workers),
        min_interval_ms: 1,
        model_size: Size::new(width, height),
        ..SimulationConfig::default()
    };
    (Simulation::new(config, parts).unwrap(), ids)
}

fn fill(sim: &Simulation, part: PartId, cells: &[(i32, i32)]) -> Vec<CellRef> {
    let mut tx = sim.access();
    let refs: Vec<CellRef> = cells.iter().map(|&(x, y)| model_cell(tx.model(), x, y)).collect();
    for &cell in &refs {
        tx.place_part(cell, part);
    }
    tx.commit();
    refs
}

fn read_bool(sim: &Simulation, cell: CellRef, id: PropertyId) -> bool {
    let tx = sim.access();
    let value = tx.model().world.cell(cell).get(id, false).cloned();
    tx.rollback();
    value.and_then(|v| v.get::<bool>().ok()).unwrap_or(false)
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn attach_comes_first_and_detach_last() {
    let (sim, _) = simulation(2, 2, 2);
    let (recorder, log) = Recorder::new("ui");
    sim.attach(Box::new(recorder)).unwrap();
    sim.commence(AutomatonState::Step);
    assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));

    let handed_back = sim.detach("ui").unwrap();
    assert_eq!(handed_back.name(), "ui");
    sim.run();
    assert!(sim.wait_for_tick(3, WAIT));

    let log = log.lock().unwrap().clone();
    assert_eq!(log.first().map(String::as_str), Some("ui:attach"));
    assert_eq!(log.last().map(String::as_str), Some("ui:detach"));
    assert_eq!(
        log,
        vec!["ui:attach", "ui:step", "ui:cycle 1", "ui:stop", "ui:detach"]
    );
}

#[test]
fn duplicate_participant_is_rejected() {
    let (sim, _) = simulation(2, 2, 1);
    sim.attach(Box::new(Recorder::new("ui").0)).unwrap();
    let err = sim.attach(Box::new(Recorder::new("ui").0)).unwrap_err();
    assert!(matches!(err, SimulationError::DuplicateParticipant(ref name) if name == "ui"));
    assert_eq!(sim.participants(), vec!["ui".to_string()]);
    assert!(matches!(sim.detach("nobody"), Err(SimulationError::UnknownParticipant(_))));
}

#[test]
fn shutdown_detaches_in_reverse_attach_order() {
    let (sim, _) = simulation(2, 2, 1);
    let log = Log::default();
    for name in ["first", "second"] {
        let (mut recorder, _) = Recorder::new(name);
        recorder.log = Arc::clone(&log);
        sim.attach(Box::new(recorder)).unwrap();
    }
    sim.shutdown();
    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec!["first:attach", "second:attach", "second:detach", "first:detach"]
    );
}

// ============================================================================
// Tick atomicity
// ============================================================================

#[test]
fn participants_see_whole_ticks_only() {
    let (sim, ids) = simulation(6, 6, 4);
    let toggles: Vec<(i32, i32)> = (0..6).flat_map(|y| (0..3).map(move |x| (x, y))).collect();
    let counters: Vec<(i32, i32)> = (0..6).flat_map(|y| (3..6).map(move |x| (x, y))).collect();
    let toggles = fill(&sim, ids.toggle, &toggles);
    let counters = fill(&sim, ids.counter, &counters);

    sim.commence(AutomatonState::Run);
    for _ in 0..40 {
        let tx = sim.access();
        let tick = tx.tick();
        let world = &tx.model().world;
        for &cell in &counters {
            let count = world.cell(cell).get(COUNT, false).and_then(|v| v.get::<i64>().ok());
            assert_eq!(count, Some(tick as i64), "counter lags tick {tick}");
        }
        for &cell in &toggles {
            let state = world.cell(cell).get(STATE, false).and_then(|v| v.get::<bool>().ok());
            assert_eq!(state, Some(tick % 2 == 1), "toggle out of phase at tick {tick}");
        }
        tx.rollback();
        std::thread::sleep(Duration::from_millis(1));
    }
    sim.stop();
    assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));
}

#[test]
fn wired_lamp_reads_the_pre_tick_snapshot() {
    let (sim, ids) = simulation(3, 1, 2);
    let (recorder, log) = Recorder::new("ui");
    sim.attach(Box::new(recorder)).unwrap();
    let toggle = fill(&sim, ids.toggle, &[(0, 0)])[0];
    let lamp = fill(&sim, ids.lamp, &[(1, 0)])[0];
    {
        let mut tx = sim.access();
        tx.cell(toggle).connect(ConnectionUse::new("OUT"), Coord::new(1, 0));
        tx.regulate(toggle, STATE, Value::from(true));
    }
    assert!(log.lock().unwrap().iter().any(|e| e == "ui:wire OUT[0] 0,0 -> 1,0"));

    sim.commence(AutomatonState::Step);
    assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));
    assert!(sim.wait_for_tick(1, WAIT));
    // The lamp saw the toggle before it flipped.
    assert!(read_bool(&sim, lamp, LIT));
    assert!(!read_bool(&sim, toggle, STATE));

    sim.step();
    assert!(sim.wait_for_tick(2, WAIT));
    assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));
    assert!(!read_bool(&sim, lamp, LIT));
    assert!(read_bool(&sim, toggle, STATE));
}

#[test]
fn indexed_wires_to_one_target_count_twice() {
    let (sim, ids) = simulation(3, 1, 1);
    let cells = fill(&sim, ids.toggle, &[(0, 0), (2, 0)]);
    {
        let mut tx = sim.access();
        let mut source = tx.cell(cells[0]);
        source.connect(ConnectionUse::indexed("PIN", 4), Coord::new(2, 0));
        source.connect(ConnectionUse::indexed("PIN", 2), Coord::new(2, 0));
    }
    let tx = sim.access();
    let grid = tx.model().world.grid(GridKind::Model);
    let a = grid.key_at(Coord::new(0, 0)).unwrap();
    let b = grid.key_at(Coord::new(2, 0)).unwrap();
    let source = grid.cell(a).unwrap();
    assert_eq!(source.connection(&ConnectionUse::indexed("PIN", 4)), Some(b));
    assert_eq!(source.connection(&ConnectionUse::indexed("PIN", 2)), Some(b));
    assert_eq!(grid.cell(b).unwrap().inverse_count(a), 2);
    tx.rollback();
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn failing_parts_are_reported_and_the_tick_completes() {
    let (sim, ids) = simulation(3, 1, 3);
    let (recorder, _) = Recorder::new("ui");
    let exceptions = Arc::clone(&recorder.exceptions);
    sim.attach(Box::new(recorder)).unwrap();
    fill(&sim, ids.faulty, &[(0, 0)]);
    fill(&sim, ids.panicky, &[(1, 0)]);
    let counter = fill(&sim, ids.counter, &[(2, 0)])[0];

    sim.commence(AutomatonState::Step);
    assert!(sim.wait_for_tick(1, WAIT));
    assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));

    let exceptions = exceptions.lock().unwrap().clone();
    let mut failed: Vec<&str> = exceptions.iter().map(|e| e.part.as_str()).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec!["faulty", "panicky"]);
    assert!(exceptions.iter().all(|e| e.hook == Hook::Cycle));

    let tx = sim.access();
    let count = tx.model().world.cell(counter).get(COUNT, false).cloned();
    tx.rollback();
    assert_eq!(count, Some(Value::from(1i64)));
}

#[test]
fn removed_part_stops_running() {
    let (sim, ids) = simulation(2, 1, 2);
    let cells = fill(&sim, ids.counter, &[(0, 0), (1, 0)]);
    sim.commence(AutomatonState::Step);
    assert!(sim.wait_for_tick(1, WAIT));
    assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));

    let reassigned = sim.remove_part(ids.counter).unwrap();
    assert_eq!(reassigned.len(), 2);
    assert_eq!(sim.part_id("counter"), None);

    sim.step();
    assert!(sim.wait_for_tick(2, WAIT));
    let tx = sim.access();
    for &cell in &cells {
        assert_eq!(tx.model().world.cell(cell).part(), PartId::EMPTY);
    }
    tx.rollback();
}

#[test]
fn pressing_a_spawner_drops_cargo_that_conveyors_carry() {
    let (parts, ids): (PartRegistry, SampleParts) = sample_registry();
    let config = SimulationConfig {
        workers: Some(2),
        min_interval_ms: 1,
        ..SimulationConfig::default()
    };
    let sim = Simulation::new(config, parts).unwrap();
    let spawner = fill(&sim, ids.spawner, &[(0, 0)])[0];
    fill(&sim, ids.conveyor, &[(1, 0), (2, 0)]);
    {
        let mut tx = sim.access();
        assert!(tx.press(spawner, CoordF::new(0.0, 0.0)));
    }
    {
        let tx = sim.access();
        assert_eq!(tx.model().world.cargo().len(), 1);
        tx.rollback();
    }
    // The spawner does not move cargo; push it onto the belt by hand.
    {
        let mut tx = sim.access();
        let (id, _) = tx.model().world.cargo().iter().next().unwrap();
        tx.cell(CellRef::Cargo(id)).push(CoordF::new(1.0, 0.0));
    }
    sim.commence(AutomatonState::Step);
    assert!(sim.wait_for_tick(1, WAIT));
    assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));

    let tx = sim.access();
    let (_, cargo) = tx.model().world.cargo().iter().next().unwrap();
    assert_eq!(cargo.position(), CoordF::new(2.0, 0.0));
    tx.rollback();
}
