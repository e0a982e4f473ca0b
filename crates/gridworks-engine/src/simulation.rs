//! The embedding surface: one simulation with its driver, parts and
//! participants.

use crate::automaton::{Automaton, AutomatonError, AutomatonState, Command};
use crate::config::{ConfigError, SimulationConfig};
use crate::participant::{Participant, ParticipantError};
use crate::shared::{Core, Shared};
use crate::tick::TickProfile;
use crate::transaction::Transaction;
use gridworks_core::format::{FormatError, read_model, write_model};
use gridworks_core::geometry::Size;
use gridworks_core::id::{CellRef, PartId};
use gridworks_core::model::Model;
use gridworks_core::part::{Part, PartRegistry, RegistryError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("a participant named {0:?} is already attached")]
    DuplicateParticipant(String),
    #[error("no participant named {0:?} is attached")]
    UnknownParticipant(String),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Automaton(#[from] AutomatonError),
}

impl From<ParticipantError> for SimulationError {
    fn from(err: ParticipantError) -> Self {
        match err {
            ParticipantError::Duplicate(name) => SimulationError::DuplicateParticipant(name),
            ParticipantError::Unknown(name) => SimulationError::UnknownParticipant(name),
        }
    }
}

/// A running simulation.
///
/// ```rust,ignore
/// let sim = Simulation::new(SimulationConfig::default(), parts)?;
/// sim.attach(Box::new(MyView::default()))?;
/// sim.commence(AutomatonState::Run);
/// sim.wait_for_tick(10, Duration::from_secs(1));
/// let mut tx = sim.access();
/// tx.place_part(cell, lamp);
/// drop(tx);
/// ```
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    shared: Arc<Shared>,
    automaton: Automaton,
}

impl Simulation {
    /// A blank model sized by `config`, driven by a new automaton waiting in
    /// [`AutomatonState::Init`].
    pub fn new(config: SimulationConfig, parts: PartRegistry) -> Result<Self, SimulationError> {
        config.validate()?;
        let model = Model::blank(&config.model_name, config.model_size, &config.bank_name, config.bank_size);
        let shared = Arc::new(Shared::new(Core::new(model, parts)));
        let automaton = Automaton::spawn(Arc::clone(&shared), &config)?;
        Ok(Self {
            config,
            shared,
            automaton,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Size of the worker pool, driver thread included.
    pub fn workers(&self) -> usize {
        self.automaton.workers()
    }

    /// Exclusive access between ticks. Blocks until the current tick, if
    /// any, has finished.
    pub fn access(&self) -> Transaction<'_> {
        Transaction::new(self.shared.gate.enter())
    }

    // -----------------------------------------------------------------------
    // Parts
    // -----------------------------------------------------------------------

    pub fn include_part(&self, part: Part) -> Result<PartId, SimulationError> {
        let mut core = self.shared.gate.enter();
        let name = part.name().to_string();
        let id = core.parts.register(part)?;
        core.participants.broadcast(|p| p.on_part_included(id, &name));
        tracing::info!(part = %name, id = id.0, "part included");
        Ok(id)
    }

    /// Unregister a part. Its cells become empty cells and stop running.
    pub fn remove_part(&self, id: PartId) -> Result<Vec<CellRef>, SimulationError> {
        let mut core = self.shared.gate.enter();
        let part = core.parts.remove(id)?;
        let cells = core.model.world.reassign_part(id, PartId::EMPTY);
        for cell in &cells {
            core.process.forget(*cell);
        }
        core.participants.broadcast(|p| p.on_part_removed(id, part.name()));
        tracing::info!(part = part.name(), cells = cells.len(), "part removed");
        Ok(cells)
    }

    pub fn part_id(&self, name: &str) -> Option<PartId> {
        self.shared.gate.enter().parts.id_of(name)
    }

    // -----------------------------------------------------------------------
    // Participants
    // -----------------------------------------------------------------------

    pub fn attach(&self, participant: Box<dyn Participant>) -> Result<(), SimulationError> {
        self.shared.gate.enter().participants.attach(participant)?;
        Ok(())
    }

    /// Detach a participant and hand it back.
    pub fn detach(&self, name: &str) -> Result<Box<dyn Participant>, SimulationError> {
        Ok(self.shared.gate.enter().participants.detach(name)?)
    }

    pub fn participants(&self) -> Vec<String> {
        self.shared.gate.enter().participants.names()
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Leave [`AutomatonState::Init`] for `state`.
    pub fn commence(&self, state: AutomatonState) {
        self.send(Command::Commence(state));
    }

    pub fn run(&self) {
        self.send(Command::Run);
    }

    pub fn step(&self) {
        self.send(Command::Step);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    fn send(&self, command: Command) {
        if !self.automaton.send(command) {
            tracing::warn!(?command, "automaton is gone, request dropped");
        }
    }

    pub fn state(&self) -> AutomatonState {
        self.shared.progress().state
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> u64 {
        self.shared.progress().tick
    }

    /// Wait until at least `tick` ticks have completed.
    pub fn wait_for_tick(&self, tick: u64, timeout: Duration) -> bool {
        self.shared.wait_until(timeout, |p| p.tick >= tick)
    }

    pub fn wait_for_state(&self, state: AutomatonState, timeout: Duration) -> bool {
        self.shared.wait_until(timeout, |p| p.state == state)
    }

    pub fn last_profile(&self) -> Option<TickProfile> {
        self.shared.gate.enter().profile.clone()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Replace the model with one parsed from `text`. On error the current
    /// model is kept.
    pub fn load_str(&self, text: &str) -> Result<(), SimulationError> {
        let mut core = self.shared.gate.enter();
        let model = read_model(text, &core.parts)?;
        core.model = model;
        core.process.clear();
        core.init_relative_all();
        let info = core.model.info.clone();
        core.participants.broadcast(|p| p.on_model_loaded(&info));
        tracing::info!(title = %info.title, "model loaded");
        Ok(())
    }

    pub fn store_string(&self) -> String {
        let core = self.shared.gate.enter();
        write_model(&core.model, &core.parts)
    }

    pub fn load_file(&self, path: &Path) -> Result<(), SimulationError> {
        let text = std::fs::read_to_string(path).map_err(|source| SimulationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_str(&text)
    }

    pub fn store_file(&self, path: &Path) -> Result<(), SimulationError> {
        std::fs::write(path, self.store_string()).map_err(|source| SimulationError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Stop the driver, detach every participant and return the model.
    pub fn shutdown(mut self) -> Model {
        self.teardown();
        let mut core = self.shared.gate.enter();
        std::mem::replace(&mut core.model, Model::blank("", Size::default(), "", Size::default()))
    }

    fn teardown(&mut self) {
        self.automaton.shutdown();
        let detached = self.shared.gate.enter().participants.detach_all();
        if !detached.is_empty() {
            tracing::info!(count = detached.len(), "participants detached at shutdown");
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridworks_core::id::GridKind;
    use gridworks_core::test_utils::*;
    use gridworks_core::value::Value;

    const WAIT: Duration = Duration::from_secs(5);

    fn config() -> SimulationConfig {
        SimulationConfig {
            workers: Some(2),
            min_interval_ms: 0,
            model_size: Size::new(4, 3),
            ..SimulationConfig::default()
        }
    }

    fn simulation() -> (Simulation, SampleParts) {
        let (parts, ids) = sample_registry();
        (Simulation::new(config(), parts).unwrap(), ids)
    }

    #[test]
    fn starts_in_init_without_ticking() {
        let (sim, _) = simulation();
        assert_eq!(sim.state(), AutomatonState::Init);
        sim.run();
        assert!(!sim.wait_for_tick(1, Duration::from_millis(50)));
        assert_eq!(sim.tick(), 0);
    }

    #[test]
    fn step_runs_exactly_one_tick() {
        let (sim, ids) = simulation();
        let cell = {
            let mut tx = sim.access();
            let cell = model_cell(tx.model(), 0, 0);
            tx.place_part(cell, ids.counter);
            cell
        };
        sim.commence(AutomatonState::Stop);
        assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));
        sim.step();
        assert!(sim.wait_for_tick(1, WAIT));
        assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sim.tick(), 1);
        let tx = sim.access();
        assert_eq!(tx.model().world.cell(cell).get(COUNT, false), Some(&Value::from(1i64)));
    }

    #[test]
    fn run_then_stop() {
        let (sim, _) = simulation();
        sim.commence(AutomatonState::Run);
        assert!(sim.wait_for_tick(3, WAIT));
        sim.stop();
        assert!(sim.wait_for_state(AutomatonState::Stop, WAIT));
        let stopped_at = sim.tick();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sim.tick(), stopped_at);
        assert!(sim.last_profile().is_some_and(|p| p.tick == stopped_at && p.workers == 2));
    }

    #[test]
    fn failed_load_keeps_model() {
        let (sim, ids) = simulation();
        {
            let mut tx = sim.access();
            let cell = model_cell(tx.model(), 1, 1);
            tx.place_part(cell, ids.toggle);
        }
        let before = sim.store_string();
        let err = sim.load_str("simulation 1\ngrid model \"m\" 2x2\ngcell\nat model 9,9\npart toggle\nend\n");
        assert!(matches!(err, Err(SimulationError::Format(FormatError::Cell { line: 4, .. }))));
        assert_eq!(sim.store_string(), before);
    }

    #[test]
    fn load_replaces_model_and_reinitialises() {
        let (sim, ids) = simulation();
        sim.load_str("simulation 1\nname \"loaded\"\ngrid model \"m\" 2x2\ngcell\nat model 1,0\npart toggle\nend\n")
            .unwrap();
        let tx = sim.access();
        assert_eq!(tx.model().info.title, "loaded");
        assert_eq!(tx.model().world.grid(GridKind::Model).size(), Size::new(2, 2));
        let cell = model_cell(tx.model(), 1, 0);
        assert_eq!(tx.model().world.cell(cell).part(), ids.toggle);
        // init_relative falls back to init_static, which wakes the toggle.
        assert_eq!(tx.process().cycling().collect::<Vec<_>>(), vec![cell]);
    }

    #[test]
    fn removing_a_part_empties_its_cells() {
        let (sim, ids) = simulation();
        let cell = {
            let mut tx = sim.access();
            let cell = model_cell(tx.model(), 2, 2);
            tx.place_part(cell, ids.lamp);
            cell
        };
        assert_eq!(sim.remove_part(ids.lamp).unwrap(), vec![cell]);
        assert!(matches!(
            sim.remove_part(PartId::EMPTY),
            Err(SimulationError::Registry(RegistryError::Protected(_)))
        ));
        let tx = sim.access();
        assert_eq!(tx.model().world.cell(cell).part(), PartId::EMPTY);
        assert!(tx.process().activity(cell).is_none());
    }

    #[test]
    fn store_and_load_file() {
        let (sim, ids) = simulation();
        {
            let mut tx = sim.access();
            let cell = model_cell(tx.model(), 3, 2);
            tx.place_part(cell, ids.counter);
        }
        let path = std::env::temp_dir().join(format!("gridworks-sim-{}.grid", std::process::id()));
        sim.store_file(&path).unwrap();
        let (other, _) = simulation();
        other.load_file(&path).unwrap();
        assert_eq!(other.store_string(), sim.store_string());
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(other.load_file(&path), Err(SimulationError::Io { .. })));
    }
}
