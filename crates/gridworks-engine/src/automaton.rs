//! The tick driver: a state machine on its own thread.
//!
//! Control requests arrive over a channel. While running, the driver waits
//! on the channel only until the next tick is due, so ticks start no closer
//! together than the configured minimum interval and a stop request is
//! honoured at the next tick boundary.

use crate::config::{IterationMode, SimulationConfig};
use crate::shared::{Progress, Shared};
use crate::tick::run_tick;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rayon::ThreadPool;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutomatonState {
    /// Not yet commenced.
    Init,
    Run,
    /// Run one tick, then stop.
    Step,
    Stop,
}

impl AutomatonState {
    pub fn name(&self) -> &'static str {
        match self {
            AutomatonState::Init => "init",
            AutomatonState::Run => "run",
            AutomatonState::Step => "step",
            AutomatonState::Stop => "stop",
        }
    }

    pub fn is_ticking(&self) -> bool {
        matches!(self, AutomatonState::Run | AutomatonState::Step)
    }
}

impl fmt::Display for AutomatonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A control request for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Commence(AutomatonState),
    Run,
    Step,
    Stop,
    Shutdown,
}

/// The state `command` leads to from `state`, or `None` if the request is
/// not valid there.
pub fn transition(state: AutomatonState, command: Command) -> Option<AutomatonState> {
    use AutomatonState::*;
    match (state, command) {
        (Init, Command::Commence(next @ (Run | Step | Stop))) => Some(next),
        (Run, Command::Stop) | (Step, Command::Stop) => Some(Stop),
        (Stop, Command::Run) => Some(Run),
        (Stop, Command::Step) => Some(Step),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AutomatonError {
    #[error("cannot build worker pool: {0}")]
    Pool(String),
    #[error("cannot start driver thread: {0}")]
    Spawn(String),
}

// ===========================================================================
// Automaton
// ===========================================================================

/// Handle to the driver thread. Dropping it shuts the driver down.
#[derive(Debug)]
pub struct Automaton {
    commands: Sender<Command>,
    driver: Option<JoinHandle<()>>,
    workers: usize,
}

impl Automaton {
    /// Build the worker pool and start the driver in [`AutomatonState::Init`].
    pub(crate) fn spawn(shared: Arc<Shared>, config: &SimulationConfig) -> Result<Self, AutomatonError> {
        let workers = config.resolved_workers();
        let pool = if workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers - 1)
                .thread_name(|i| format!("gridworks-worker-{}", i + 1))
                .build()
                .map_err(|e| AutomatonError::Pool(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        let driver = Driver {
            shared,
            commands: rx,
            pool,
            workers,
            mode: config.iteration,
            interval: config.min_interval(),
            state: AutomatonState::Init,
        };
        let handle = std::thread::Builder::new()
            .name("gridworks-driver".to_string())
            .spawn(move || driver.run())
            .map_err(|e| AutomatonError::Spawn(e.to_string()))?;
        tracing::info!(workers, mode = ?config.iteration, interval_ms = config.min_interval_ms, "automaton started");
        Ok(Self {
            commands: tx,
            driver: Some(handle),
            workers,
        })
    }

    /// Queue a request. Returns false once the driver is gone.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Stop the driver and wait for it. A tick in flight completes first.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.driver.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        if handle.join().is_err() {
            tracing::error!("driver thread panicked");
        }
    }
}

impl Drop for Automaton {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ===========================================================================
// Driver
// ===========================================================================

struct Driver {
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    pool: Option<ThreadPool>,
    workers: usize,
    mode: IterationMode,
    interval: Duration,
    state: AutomatonState,
}

impl Driver {
    fn run(mut self) {
        let mut next_tick = Instant::now();
        loop {
            let received = if self.state.is_ticking() {
                match self.commands.recv_deadline(next_tick) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match self.commands.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };
            match received {
                Some(Command::Shutdown) => break,
                Some(command) => self.handle(command),
                None => {
                    next_tick = Instant::now() + self.interval;
                    self.tick();
                }
            }
        }
        tracing::info!(state = %self.state, "automaton stopped");
    }

    fn handle(&mut self, command: Command) {
        let Some(next) = transition(self.state, command) else {
            tracing::debug!(state = %self.state, ?command, "request ignored");
            return;
        };
        tracing::info!(from = %self.state, to = %next, "automaton state changed");
        self.state = next;
        {
            let mut core = self.shared.gate.yield_then_enter();
            match next {
                AutomatonState::Run => core.participants.broadcast(|p| p.on_run()),
                AutomatonState::Step => core.participants.broadcast(|p| p.on_step()),
                AutomatonState::Stop => core.participants.broadcast(|p| p.on_stop()),
                AutomatonState::Init => {}
            }
        }
        self.shared.publish_state(next);
    }

    fn tick(&mut self) {
        let waiting = Instant::now();
        let mut core = self.shared.gate.yield_then_enter();
        let waited = waiting.elapsed();
        let profile = run_tick(&mut core, self.pool.as_ref(), self.workers, self.mode, waited);
        if self.state == AutomatonState::Step {
            self.state = AutomatonState::Stop;
            core.participants.broadcast(|p| p.on_stop());
            tracing::info!(tick = profile.tick, "step complete");
        }
        drop(core);
        self.shared.publish(Progress {
            tick: profile.tick,
            state: self.state,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AutomatonState::*;

    #[test]
    fn commence_leaves_init_only() {
        assert_eq!(transition(Init, Command::Commence(Run)), Some(Run));
        assert_eq!(transition(Init, Command::Commence(Step)), Some(Step));
        assert_eq!(transition(Init, Command::Commence(Stop)), Some(Stop));
        assert_eq!(transition(Init, Command::Commence(Init)), None);
        assert_eq!(transition(Init, Command::Run), None);
        assert_eq!(transition(Stop, Command::Commence(Run)), None);
    }

    #[test]
    fn run_and_stop_alternate() {
        assert_eq!(transition(Run, Command::Stop), Some(Stop));
        assert_eq!(transition(Stop, Command::Run), Some(Run));
        assert_eq!(transition(Run, Command::Run), None);
        assert_eq!(transition(Stop, Command::Stop), None);
    }

    #[test]
    fn step_only_from_stop() {
        assert_eq!(transition(Stop, Command::Step), Some(Step));
        assert_eq!(transition(Run, Command::Step), None);
        assert_eq!(transition(Step, Command::Stop), Some(Stop));
        assert_eq!(transition(Step, Command::Run), None);
    }
}
