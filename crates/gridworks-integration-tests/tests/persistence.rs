//! Saving and loading models through a live simulation.

use gridworks_core::geometry::{Coord, CoordF, Size};
use gridworks_core::id::{CellRef, ConnectionUse, GridKind};
use gridworks_core::model::ModelInfo;
use gridworks_core::test_utils::*;
use gridworks_core::value::Value;
use gridworks_engine::config::SimulationConfig;
use gridworks_engine::{AutomatonState, Participant, Simulation, SimulationError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn simulation() -> (Simulation, SampleParts) {
    let (parts, ids) = sample_registry();
    let config = SimulationConfig {
        workers: Some(2),
        min_interval_ms: 1,
        model_size: Size::new(4, 3),
        bank_size: Size::new(2, 1),
        ..SimulationConfig::default()
    };
    (Simulation::new(config, parts).unwrap(), ids)
}

/// A toggle wired into a lamp, a conveyor and one crate.
fn build(sim: &Simulation, ids: &SampleParts) {
    let mut tx = sim.access();
    let toggle = model_cell(tx.model(), 0, 0);
    let lamp = model_cell(tx.model(), 1, 0);
    let conveyor = model_cell(tx.model(), 2, 1);
    let spawner = model_cell(tx.model(), 3, 2);
    tx.place_part(toggle, ids.toggle);
    tx.place_part(lamp, ids.lamp);
    tx.place_part(conveyor, ids.conveyor);
    tx.place_part(spawner, ids.spawner);
    tx.update_info(ModelInfo {
        title: "Blinker".to_string(),
        author: "gridworks".to_string(),
        version: "1.0".to_string(),
        description: "a toggle driving a lamp".to_string(),
        editable: true,
    });
    tx.commit();

    let mut tx = sim.access();
    tx.cell(toggle).connect(ConnectionUse::new("OUT"), Coord::new(1, 0));
    tx.regulate(toggle, STATE, Value::from(true));
    tx.cell(conveyor).set(SPEED, 0.5f64);
    assert!(tx.press(spawner, CoordF::new(3.0, 2.0)));
    tx.commit();
}

#[derive(Default)]
struct Loads {
    titles: Arc<Mutex<Vec<String>>>,
}

impl Participant for Loads {
    fn name(&self) -> &str {
        "loads"
    }

    fn on_model_loaded(&mut self, info: &ModelInfo) {
        self.titles.lock().unwrap().push(info.title.clone());
    }
}

#[test]
fn store_then_load_reproduces_the_model() {
    let (sim, ids) = simulation();
    build(&sim, &ids);
    let text = sim.store_string();
    assert!(text.contains("name \"Blinker\""));
    assert!(text.contains("wire OUT[0] 1,0"));

    let (other, _) = simulation();
    let loads = Loads::default();
    let titles = Arc::clone(&loads.titles);
    other.attach(Box::new(loads)).unwrap();
    other.load_str(&text).unwrap();
    assert_eq!(titles.lock().unwrap().as_slice(), ["Blinker".to_string()]);
    assert_eq!(other.store_string(), text);

    let tx = other.access();
    let model = tx.model();
    assert_eq!(model.info.title, "Blinker");
    assert_eq!(model.world.cargo().len(), 1);
    let grid = model.world.grid(GridKind::Model);
    let lamp = grid.key_at(Coord::new(1, 0)).unwrap();
    let toggle = grid.key_at(Coord::new(0, 0)).unwrap();
    assert_eq!(grid.cell(toggle).unwrap().connection(&ConnectionUse::new("OUT")), Some(lamp));
    assert_eq!(grid.cell(lamp).unwrap().inverse_count(toggle), 1);
    let conveyor = model.world.cell(CellRef::grid(GridKind::Model, grid.key_at(Coord::new(2, 1)).unwrap()));
    assert_eq!(conveyor.get(SPEED, false), Some(&Value::from(0.5f64)));
    tx.rollback();
}

#[test]
fn loaded_model_keeps_running() {
    let (sim, ids) = simulation();
    build(&sim, &ids);
    let text = sim.store_string();

    let (other, _) = simulation();
    other.load_str(&text).unwrap();
    other.commence(AutomatonState::Step);
    assert!(other.wait_for_tick(1, WAIT));
    assert!(other.wait_for_state(AutomatonState::Stop, WAIT));

    let tx = other.access();
    let lamp = model_cell(tx.model(), 1, 0);
    assert_eq!(tx.model().world.cell(lamp).get(LIT, false), Some(&Value::from(true)));
    tx.rollback();
}

#[test]
fn a_bad_file_leaves_the_live_model_alone() {
    let (sim, ids) = simulation();
    build(&sim, &ids);
    let before = sim.store_string();

    let broken = before.replacen("part lamp", "part no-such-part", 1);
    let err = sim.load_str(&broken).unwrap_err();
    assert!(matches!(err, SimulationError::Format(_)));
    assert_eq!(sim.store_string(), before);

    let missing = std::env::temp_dir().join("gridworks-missing").join("model.grid");
    assert!(matches!(sim.load_file(&missing), Err(SimulationError::Io { .. })));
    assert_eq!(sim.store_string(), before);
}
