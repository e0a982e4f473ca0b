//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::context::{CellProxy, CellView, CommitReport, Context};
use crate::geometry::{Color, CoordF, Direction, Size};
use crate::id::{CargoId, CellRef, GridPos, PartId, PropertyId};
use crate::image::Image;
use crate::model::Model;
use crate::part::{Behavior, HookResult, Part, PartRegistry, PropertyEntry};
use crate::process_tab::ProcessTab;

// ===========================================================================
// Property ids
// ===========================================================================

pub const STATE: PropertyId = PropertyId(0);
pub const COUNT: PropertyId = PropertyId(1);
pub const LIT: PropertyId = PropertyId(2);
pub const DIR: PropertyId = PropertyId(3);
pub const SPEED: PropertyId = PropertyId(4);
pub const WEIGHT: PropertyId = PropertyId(5);

pub const LAMP_ON: Color = Color::rgba(255, 220, 0, 255);
pub const LAMP_OFF: Color = Color::rgba(40, 40, 40, 255);

// ===========================================================================
// Behaviours
// ===========================================================================

/// Flips `STATE` every tick.
#[derive(Debug)]
pub struct Toggle;

impl Behavior for Toggle {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.wake();
        Ok(())
    }

    fn cycle(&self, cell: &mut CellProxy<'_>) -> HookResult {
        let state = cell.read::<bool>(STATE)?;
        cell.set(STATE, !state);
        Ok(())
    }
}

/// Adds one to `COUNT` every tick.
#[derive(Debug)]
pub struct Counter;

impl Behavior for Counter {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.wake();
        Ok(())
    }

    fn cycle(&self, cell: &mut CellProxy<'_>) -> HookResult {
        let n = cell.read::<i64>(COUNT)?;
        cell.set(COUNT, n + 1);
        Ok(())
    }
}

/// Lit while any cell wired into it has `STATE` set.
#[derive(Debug)]
pub struct Lamp;

impl Behavior for Lamp {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.wake();
        Ok(())
    }

    fn cycle(&self, cell: &mut CellProxy<'_>) -> HookResult {
        let world = cell.world();
        let lit = cell
            .sources()
            .into_iter()
            .any(|src| world.cell(src).get(STATE, false).and_then(|v| v.get::<bool>().ok()) == Some(true));
        if cell.read::<bool>(LIT)? != lit {
            cell.set(LIT, lit);
        }
        Ok(())
    }

    fn draw(&self, cell: &CellView<'_>, image: &mut Image) -> HookResult {
        let color = if cell.read::<bool>(LIT)? { LAMP_ON } else { LAMP_OFF };
        image.fill(color);
        Ok(())
    }
}

/// Pushes cargo centred on it along `DIR` by `SPEED` per tick.
#[derive(Debug)]
pub struct Conveyor;

impl Behavior for Conveyor {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.start();
        Ok(())
    }

    fn moving(&self, cell: &mut CellProxy<'_>) -> HookResult {
        let dir = cell.read::<Direction>(DIR)?;
        let speed = cell.read::<f64>(SPEED)?;
        let (dx, dy) = dir.offset();
        let delta = CoordF::new(dx as f64 * speed, dy as f64 * speed);
        for cargo in cell.centered_cargo() {
            cell.push_cargo(CellRef::Cargo(cargo), delta);
        }
        Ok(())
    }
}

/// Fails every tick.
#[derive(Debug)]
pub struct Faulty;

impl Behavior for Faulty {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.wake();
        Ok(())
    }

    fn cycle(&self, _cell: &mut CellProxy<'_>) -> HookResult {
        Err("short circuit".into())
    }
}

/// Panics every tick.
#[derive(Debug)]
pub struct Panicky;

impl Behavior for Panicky {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.wake();
        Ok(())
    }

    fn cycle(&self, _cell: &mut CellProxy<'_>) -> HookResult {
        panic!("magic smoke escaped");
    }
}

/// Drops a cargo of its `cargo` part when pressed.
#[derive(Debug)]
pub struct Spawner {
    pub cargo: PartId,
}

impl Behavior for Spawner {
    fn press(&self, cell: &mut CellProxy<'_>, _at: CoordF) -> HookResult {
        if let Some(pos) = cell.position() {
            cell.spawn_cargo(self.cargo, pos.to_f());
        }
        Ok(())
    }
}

// ===========================================================================
// Registry and model
// ===========================================================================

/// Ids of the sample parts in a registry built by [`sample_registry`].
#[derive(Debug, Clone, Copy)]
pub struct SampleParts {
    pub toggle: PartId,
    pub counter: PartId,
    pub lamp: PartId,
    pub conveyor: PartId,
    pub crate_: PartId,
    pub faulty: PartId,
    pub panicky: PartId,
    pub spawner: PartId,
}

pub fn sample_registry() -> (PartRegistry, SampleParts) {
    let mut reg = PartRegistry::new();
    let mut add = |part: Part| reg.register(part).expect("sample part names are unique");
    let toggle = add(Part::builder("toggle")
        .property(PropertyEntry::new(STATE.0, "state", false).visual().editable())
        .behavior(Toggle)
        .build());
    let counter = add(Part::builder("counter")
        .property(PropertyEntry::new(COUNT.0, "count", 0i64))
        .behavior(Counter)
        .build());
    let lamp = add(Part::builder("lamp")
        .property(PropertyEntry::new(LIT.0, "lit", false).visual())
        .behavior(Lamp)
        .build());
    let conveyor = add(Part::builder("conveyor")
        .property(PropertyEntry::new(DIR.0, "dir", Direction::East).editable())
        .property(PropertyEntry::new(SPEED.0, "speed", 1.0f64).editable())
        .behavior(Conveyor)
        .build());
    let crate_ = add(Part::builder("crate")
        .property(PropertyEntry::new(WEIGHT.0, "weight", 1i64))
        .cargo_radius(0.3)
        .build());
    let faulty = add(Part::builder("faulty").behavior(Faulty).build());
    let panicky = add(Part::builder("panicky").behavior(Panicky).build());
    let spawner = add(Part::builder("spawner")
        .behavior(Spawner { cargo: crate_ })
        .build());
    let ids = SampleParts {
        toggle,
        counter,
        lamp,
        conveyor,
        crate_,
        faulty,
        panicky,
        spawner,
    };
    (reg, ids)
}

/// A blank `w`x`h` model with a 2x1 bank.
pub fn sample_model(w: u32, h: u32) -> Model {
    Model::blank("main", Size::new(w, h), "parts", Size::new(2, 1))
}

pub fn model_cell(model: &Model, x: i32, y: i32) -> CellRef {
    model
        .world
        .locate(GridPos::model(x, y).into())
        .expect("cell inside the model grid")
}

/// Place `part` on `cell` and commit immediately.
pub fn place(model: &mut Model, parts: &PartRegistry, tab: &mut ProcessTab, cell: CellRef, part: PartId) -> CommitReport {
    let mut ctx = Context::new();
    ctx.place_part(cell, part);
    ctx.commit(model, parts, tab)
}

/// Spawn a cargo of `part` on behalf of `from` and commit immediately.
pub fn spawn(
    model: &mut Model,
    parts: &PartRegistry,
    tab: &mut ProcessTab,
    from: CellRef,
    part: PartId,
    at: CoordF,
) -> CargoId {
    let mut ctx = Context::new();
    let pending = CellProxy::new(&model.world, parts, &mut ctx, from).spawn_cargo(part, at);
    let report = ctx.commit(model, parts, tab);
    report.resolve_cargo(pending).expect("spawned cargo resolves")
}
