//! Bookkeeping of which cells are cycling and which are moving.
//!
//! Transitions requested during a tick are deferred and applied as one batch
//! by [`ProcessTab::apply`], tiring and halting before waking and starting.

use crate::id::CellRef;
use std::collections::BTreeMap;
use std::ops::BitOr;

/// Activity bits of a tracked cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProcessFlags(u8);

impl ProcessFlags {
    pub const NONE: ProcessFlags = ProcessFlags(0);
    pub const CYCLE: ProcessFlags = ProcessFlags(1);
    pub const MOVE: ProcessFlags = ProcessFlags(2);

    pub fn contains(self, other: ProcessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn with(self, other: ProcessFlags) -> ProcessFlags {
        ProcessFlags(self.0 | other.0)
    }

    fn without(self, other: ProcessFlags) -> ProcessFlags {
        ProcessFlags(self.0 & !other.0)
    }
}

impl BitOr for ProcessFlags {
    type Output = ProcessFlags;

    fn bitor(self, rhs: ProcessFlags) -> ProcessFlags {
        self.with(rhs)
    }
}

/// State of a tracked cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Inactive,
    Active(ProcessFlags),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Wake,
    Tire,
    Start,
    Halt,
}

#[derive(Debug, Default, Clone)]
pub struct ProcessTab {
    entries: BTreeMap<CellRef, Activity>,
    waking: Vec<CellRef>,
    tiring: Vec<CellRef>,
    starting: Vec<CellRef>,
    halting: Vec<CellRef>,
}

impl ProcessTab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&mut self, cell: CellRef) {
        self.waking.push(cell);
    }

    pub fn tire(&mut self, cell: CellRef) {
        self.tiring.push(cell);
    }

    pub fn start(&mut self, cell: CellRef) {
        self.starting.push(cell);
    }

    pub fn halt(&mut self, cell: CellRef) {
        self.halting.push(cell);
    }

    /// Whether any transition is waiting for [`ProcessTab::apply`].
    pub fn has_pending(&self) -> bool {
        !(self.waking.is_empty() && self.tiring.is_empty() && self.starting.is_empty() && self.halting.is_empty())
    }

    /// Materialise the deferred transitions.
    pub fn apply(&mut self) {
        let tiring = std::mem::take(&mut self.tiring);
        let halting = std::mem::take(&mut self.halting);
        let waking = std::mem::take(&mut self.waking);
        let starting = std::mem::take(&mut self.starting);
        for cell in tiring {
            self.transition(cell, Request::Tire);
        }
        for cell in halting {
            self.transition(cell, Request::Halt);
        }
        for cell in waking {
            self.transition(cell, Request::Wake);
        }
        for cell in starting {
            self.transition(cell, Request::Start);
        }
    }

    fn transition(&mut self, cell: CellRef, request: Request) {
        let current = match self.entries.get(&cell) {
            Some(Activity::Active(flags)) => *flags,
            Some(Activity::Inactive) => ProcessFlags::NONE,
            None if matches!(request, Request::Tire | Request::Halt) => return,
            None => ProcessFlags::NONE,
        };
        let next = match request {
            Request::Wake => current.with(ProcessFlags::CYCLE),
            Request::Start => current.with(ProcessFlags::MOVE),
            Request::Tire => current.without(ProcessFlags::CYCLE),
            Request::Halt => current.without(ProcessFlags::MOVE),
        };
        let activity = if next.is_empty() {
            Activity::Inactive
        } else {
            Activity::Active(next)
        };
        self.entries.insert(cell, activity);
    }

    /// Stop tracking a destroyed cell, including its pending requests.
    pub fn forget(&mut self, cell: CellRef) {
        self.entries.remove(&cell);
        for queue in [&mut self.waking, &mut self.tiring, &mut self.starting, &mut self.halting] {
            queue.retain(|c| *c != cell);
        }
    }

    /// Keep only cells for which `keep` holds.
    pub fn retain(&mut self, mut keep: impl FnMut(CellRef) -> bool) {
        self.entries.retain(|cell, _| keep(*cell));
        for queue in [&mut self.waking, &mut self.tiring, &mut self.starting, &mut self.halting] {
            queue.retain(|c| keep(*c));
        }
    }

    pub fn activity(&self, cell: CellRef) -> Option<Activity> {
        self.entries.get(&cell).copied()
    }

    pub fn flags(&self, cell: CellRef) -> ProcessFlags {
        match self.entries.get(&cell) {
            Some(Activity::Active(flags)) => *flags,
            _ => ProcessFlags::NONE,
        }
    }

    /// Cells with the CYCLE bit, in stable order.
    pub fn cycling(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.with_flag(ProcessFlags::CYCLE)
    }

    /// Cells with the MOVE bit, in stable order.
    pub fn moving(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.with_flag(ProcessFlags::MOVE)
    }

    fn with_flag(&self, flag: ProcessFlags) -> impl Iterator<Item = CellRef> + '_ {
        self.entries.iter().filter_map(move |(cell, a)| match a {
            Activity::Active(flags) if flags.contains(flag) => Some(*cell),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
