//! The parts the demo model is built from.

use gridworks_core::context::{CellProxy, CellView};
use gridworks_core::geometry::{Color, CoordF, Direction};
use gridworks_core::id::{CellRef, PartId, PropertyId};
use gridworks_core::image::Image;
use gridworks_core::part::{Behavior, HookResult, Part, PartRegistry, PropertyEntry, RegistryError};

pub const STATE: PropertyId = PropertyId(0);
pub const PHASE: PropertyId = PropertyId(1);
pub const PERIOD: PropertyId = PropertyId(2);
pub const LIT: PropertyId = PropertyId(0);
pub const DIR: PropertyId = PropertyId(0);
pub const SPEED: PropertyId = PropertyId(1);
pub const LAPS: PropertyId = PropertyId(0);

const LAMP_ON: Color = Color::rgba(255, 200, 40, 255);
const LAMP_OFF: Color = Color::rgba(30, 30, 30, 255);

/// Flips `STATE` every `PERIOD` ticks.
#[derive(Debug)]
struct Clock;

impl Behavior for Clock {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.wake();
        Ok(())
    }

    fn cycle(&self, cell: &mut CellProxy<'_>) -> HookResult {
        let period = cell.read::<i64>(PERIOD)?.max(1);
        let phase = cell.read::<i64>(PHASE)? + 1;
        if phase >= period {
            let state = cell.read::<bool>(STATE)?;
            cell.set(STATE, !state);
            cell.set(PHASE, 0i64);
        } else {
            cell.set(PHASE, phase);
        }
        Ok(())
    }
}

/// Lit while a cell wired into it has `STATE` set.
#[derive(Debug)]
struct Lamp;

impl Behavior for Lamp {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.wake();
        Ok(())
    }

    fn cycle(&self, cell: &mut CellProxy<'_>) -> HookResult {
        let world = cell.world();
        let lit = cell.sources().into_iter().any(|src| {
            world
                .cell(src)
                .get(STATE, false)
                .and_then(|v| v.get::<bool>().ok())
                .unwrap_or(false)
        });
        if cell.read::<bool>(LIT)? != lit {
            cell.set(LIT, lit);
        }
        Ok(())
    }

    fn draw(&self, cell: &CellView<'_>, image: &mut Image) -> HookResult {
        image.fill(if cell.read::<bool>(LIT)? { LAMP_ON } else { LAMP_OFF });
        Ok(())
    }
}

/// Carries cargo centred on it one step along `DIR`. Pressing it drops a
/// fresh crate.
#[derive(Debug)]
struct Belt {
    cargo: PartId,
}

impl Behavior for Belt {
    fn init_static(&self, cell: &mut CellProxy<'_>) -> HookResult {
        cell.start();
        Ok(())
    }

    fn moving(&self, cell: &mut CellProxy<'_>) -> HookResult {
        let (dx, dy) = cell.read::<Direction>(DIR)?.offset();
        let speed = cell.read::<f64>(SPEED)?;
        let delta = CoordF::new(dx as f64 * speed, dy as f64 * speed);
        for cargo in cell.centered_cargo() {
            cell.push_cargo(CellRef::Cargo(cargo), delta);
        }
        Ok(())
    }

    fn press(&self, cell: &mut CellProxy<'_>, _at: CoordF) -> HookResult {
        if let Some(pos) = cell.position() {
            cell.spawn_cargo(self.cargo, pos.to_f());
            cell.message(format!("crate dropped at {pos}"));
        }
        Ok(())
    }
}

/// Ids of the demo parts.
#[derive(Debug, Clone, Copy)]
pub struct DemoParts {
    pub clock: PartId,
    pub lamp: PartId,
    pub belt: PartId,
    pub crate_: PartId,
}

pub fn registry() -> Result<(PartRegistry, DemoParts), RegistryError> {
    let mut parts = PartRegistry::new();
    let clock = parts.register(
        Part::builder("clock")
            .description("flips its output every few ticks")
            .property(PropertyEntry::new(STATE.0, "state", false).visual())
            .property(PropertyEntry::new(PHASE.0, "phase", 0i64))
            .property(PropertyEntry::new(PERIOD.0, "period", 4i64).editable())
            .behavior(Clock)
            .build(),
    )?;
    let lamp = parts.register(
        Part::builder("lamp")
            .property(PropertyEntry::new(LIT.0, "lit", false).visual())
            .behavior(Lamp)
            .build(),
    )?;
    let crate_ = parts.register(
        Part::builder("crate")
            .property(PropertyEntry::new(LAPS.0, "laps", 0i64))
            .cargo_radius(0.3)
            .build(),
    )?;
    let belt = parts.register(
        Part::builder("belt")
            .property(PropertyEntry::new(DIR.0, "dir", Direction::East).editable())
            .property(PropertyEntry::new(SPEED.0, "speed", 1.0f64).editable())
            .behavior(Belt { cargo: crate_ })
            .build(),
    )?;
    Ok((
        parts,
        DemoParts {
            clock,
            lamp,
            belt,
            crate_,
        },
    ))
}
