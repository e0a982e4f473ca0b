//! Exclusive access to the live simulation between ticks.

use crate::shared::Core;
use gridworks_core::context::{CellProxy, CommitReport, Context};
use gridworks_core::geometry::{CoordF, Size};
use gridworks_core::id::{CellHandle, CellRef, GridKind, PartId, PropertyId};
use gridworks_core::model::{Model, ModelInfo};
use gridworks_core::part::{Behavior, Hook, HookResult, PartRegistry};
use gridworks_core::process_tab::ProcessTab;
use gridworks_core::value::Value;
use std::sync::MutexGuard;

/// A participant's hold on the simulation.
///
/// No tick runs while a transaction is alive. Reads see the committed
/// world; changes are staged in the transaction's own [`Context`] and
/// applied when the transaction is committed or dropped.
/// [`Transaction::rollback`] discards them instead.
pub struct Transaction<'a> {
    core: MutexGuard<'a, Core>,
    context: Context,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(core: MutexGuard<'a, Core>) -> Self {
        Self {
            core,
            context: Context::new(),
            finished: false,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn model(&self) -> &Model {
        &self.core.model
    }

    pub fn parts(&self) -> &PartRegistry {
        &self.core.parts
    }

    pub fn process(&self) -> &ProcessTab {
        &self.core.process
    }

    /// Ticks completed so far.
    pub fn tick(&self) -> u64 {
        self.core.tick
    }

    /// The staged changes.
    pub fn context(&self) -> &Context {
        &self.context
    }

    // -----------------------------------------------------------------------
    // Staged changes
    // -----------------------------------------------------------------------

    /// A proxy for `cell` recording into this transaction.
    pub fn cell(&mut self, cell: CellRef) -> CellProxy<'_> {
        let core = &*self.core;
        CellProxy::new(&core.model.world, &core.parts, &mut self.context, cell)
    }

    /// A proxy for the cell at `handle`, if it exists.
    pub fn at(&mut self, handle: CellHandle) -> Option<CellProxy<'_>> {
        let cell = self.core.model.world.locate(handle)?;
        Some(self.cell(cell))
    }

    /// Press `cell` at `at`. Returns whether the hook succeeded.
    pub fn press(&mut self, cell: CellRef, at: CoordF) -> bool {
        self.dispatch(cell, Hook::Press, |b, c| b.press(c, at))
    }

    pub fn release(&mut self, cell: CellRef, at: CoordF) -> bool {
        self.dispatch(cell, Hook::Release, |b, c| b.release(c, at))
    }

    /// Edit a property through the part's `regulate` hook. Only properties
    /// the cell's part declares editable are accepted.
    pub fn regulate(&mut self, cell: CellRef, id: PropertyId, value: Value) -> bool {
        let part = self.core.model.world.cell(cell).part();
        let editable = self
            .core
            .parts
            .get(part)
            .and_then(|p| p.entry(id))
            .is_some_and(|e| e.policy.editable);
        if !editable {
            tracing::warn!(?cell, property = id.0, "regulate refused: property is not editable");
            return false;
        }
        self.dispatch(cell, Hook::Regulate, |b, c| b.regulate(c, id, value))
    }

    fn dispatch<F>(&mut self, cell: CellRef, hook: Hook, f: F) -> bool
    where
        F: FnOnce(&dyn Behavior, &mut CellProxy<'_>) -> HookResult,
    {
        let core = &*self.core;
        self.context.dispatch(&core.model.world, &core.parts, cell, hook, f)
    }

    /// Whether the model accepts structural edits.
    pub fn is_editable(&self) -> bool {
        self.core.model.info.editable
    }

    /// Stage a part change. Refused while the model is locked.
    pub fn place_part(&mut self, cell: CellRef, part: PartId) -> bool {
        if !self.is_editable() {
            tracing::warn!(?cell, "place_part refused: model is locked");
            return false;
        }
        self.context.place_part(cell, part);
        true
    }

    /// Stage a grid resize. Refused while the model is locked.
    pub fn resize_grid(&mut self, grid: GridKind, size: Size) -> bool {
        if !self.is_editable() {
            tracing::warn!(%grid, %size, "resize refused: model is locked");
            return false;
        }
        self.context.resize_grid(grid, size);
        true
    }

    pub fn update_info(&mut self, info: ModelInfo) {
        self.context.update_info(info);
    }

    pub fn select(&mut self, selection: Vec<CellHandle>) {
        self.context.select(selection);
    }

    pub fn message(&mut self, text: impl Into<String>) {
        self.context.message(text);
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Apply the staged changes, notify participants and release the
    /// simulation.
    pub fn commit(mut self) -> CommitReport {
        self.finish()
    }

    /// Discard the staged changes and release the simulation.
    pub fn rollback(mut self) {
        self.finished = true;
        self.context = Context::new();
        tracing::debug!("transaction rolled back");
    }

    fn finish(&mut self) -> CommitReport {
        self.finished = true;
        let core = &mut *self.core;
        let report = core.commit(&mut self.context);
        let tick = core.tick;
        core.participants.broadcast(|p| p.on_commit(tick));
        tracing::debug!(tick, transited = report.transited, events = report.events.len(), "transaction committed");
        report
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish();
        }
    }
}
