//! State shared by the tick driver, transactions and the embedding handle.

use crate::automaton::AutomatonState;
use crate::gate::{Gate, lock};
use crate::participant::ParticipantSet;
use crate::tick::TickProfile;
use gridworks_core::context::{CommitReport, Context};
use gridworks_core::model::Model;
use gridworks_core::part::{Hook, PartRegistry};
use gridworks_core::process_tab::ProcessTab;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Everything a tick or a transaction works on. Only ever reached through
/// the [`Gate`], so exactly one party holds it at a time.
#[derive(Debug)]
pub struct Core {
    pub model: Model,
    pub parts: PartRegistry,
    pub process: ProcessTab,
    pub participants: ParticipantSet,
    /// Ticks completed.
    pub tick: u64,
    pub profile: Option<TickProfile>,
}

impl Core {
    pub fn new(model: Model, parts: PartRegistry) -> Self {
        Self {
            model,
            parts,
            process: ProcessTab::new(),
            participants: ParticipantSet::new(),
            tick: 0,
            profile: None,
        }
    }

    /// Commit `context`, settle cargo and tell every participant.
    pub fn commit(&mut self, context: &mut Context) -> CommitReport {
        let mut report = context.commit(&mut self.model, &self.parts, &mut self.process);
        report.settle(&mut self.model.world);
        self.participants.deliver(&report.events);
        report
    }

    /// Run `init_relative` on every cell, as after a load.
    pub fn init_relative_all(&mut self) -> CommitReport {
        let mut context = Context::new();
        let cells: Vec<_> = self.model.world.all_cells().collect();
        for cell in cells {
            context.dispatch(&self.model.world, &self.parts, cell, Hook::InitRelative, |b, c| {
                b.init_relative(c)
            });
        }
        self.commit(&mut context)
    }
}

/// Tick count and automaton state, published for waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub tick: u64,
    pub state: AutomatonState,
}

#[derive(Debug)]
pub struct Shared {
    pub gate: Gate<Core>,
    progress: Mutex<Progress>,
    changed: Condvar,
}

impl Shared {
    pub fn new(core: Core) -> Self {
        Self {
            gate: Gate::new(core),
            progress: Mutex::new(Progress {
                tick: 0,
                state: AutomatonState::Init,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn progress(&self) -> Progress {
        *lock(&self.progress)
    }

    pub fn publish(&self, progress: Progress) {
        *lock(&self.progress) = progress;
        self.changed.notify_all();
    }

    pub fn publish_state(&self, state: AutomatonState) {
        lock(&self.progress).state = state;
        self.changed.notify_all();
    }

    /// Block until `done` holds or `timeout` passes. Returns whether it held.
    pub fn wait_until(&self, timeout: Duration, mut done: impl FnMut(&Progress) -> bool) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut progress = lock(&self.progress);
        loop {
            if done(&progress) {
                return true;
            }
            progress = match deadline {
                Some(deadline) => {
                    let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                        return false;
                    };
                    self.changed
                        .wait_timeout(progress, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self.changed.wait(progress).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}
