//! Property-based tests for the Gridworks world model.
//!
//! Uses proptest to generate random structural edit sequences and request
//! batches, then verify the graph and bookkeeping invariants hold.

use gridworks_core::format::{read_model, write_model};
use gridworks_core::geometry::{Coord, Size};
use gridworks_core::id::*;
use gridworks_core::model::Model;
use gridworks_core::process_tab::{ProcessFlags, ProcessTab};
use gridworks_core::test_utils::*;
use gridworks_core::value::Value;
use gridworks_core::world::World;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

#[derive(Debug, Clone)]
enum EditOp {
    InsertRow(u32),
    RemoveRow(u32),
    InsertColumn(u32),
    RemoveColumn(u32),
    Resize(u32, u32),
    Wire(u32, u32, u32, u32, u32),
    Unwire(u32, u32, u32),
}

fn arb_edits(max_ops: usize) -> impl Strategy<Value = Vec<EditOp>> {
    proptest::collection::vec(
        prop_oneof![
            (0..8u32).prop_map(EditOp::InsertRow),
            (0..8u32).prop_map(EditOp::RemoveRow),
            (0..8u32).prop_map(EditOp::InsertColumn),
            (0..8u32).prop_map(EditOp::RemoveColumn),
            (0..7u32, 0..7u32).prop_map(|(w, h)| EditOp::Resize(w, h)),
            (0..7u32, 0..7u32, 0..7u32, 0..7u32, 0..3u32)
                .prop_map(|(ax, ay, bx, by, pin)| EditOp::Wire(ax, ay, bx, by, pin)),
            (0..7u32, 0..7u32, 0..3u32).prop_map(|(x, y, pin)| EditOp::Unwire(x, y, pin)),
        ],
        1..=max_ops,
    )
}

fn at(x: u32, y: u32) -> Coord {
    Coord::new(x as i32, y as i32)
}

fn apply(world: &mut World, op: &EditOp) {
    let kind = GridKind::Model;
    // Out-of-range edits are rejected; the grid must stay valid either way.
    match *op {
        EditOp::InsertRow(k) => drop(world.insert_row(kind, k)),
        EditOp::RemoveRow(k) => drop(world.remove_row(kind, k)),
        EditOp::InsertColumn(k) => drop(world.insert_column(kind, k)),
        EditOp::RemoveColumn(k) => drop(world.remove_column(kind, k)),
        EditOp::Resize(w, h) => drop(world.resize_grid(kind, Size::new(w, h))),
        EditOp::Wire(ax, ay, bx, by, pin) => {
            let grid = world.grid_mut(kind);
            if let (Some(a), Some(b)) = (grid.key_at(at(ax, ay)), grid.key_at(at(bx, by))) {
                grid.add_connection(a, ConnectionUse::indexed("PIN", pin), b).unwrap();
            }
        }
        EditOp::Unwire(x, y, pin) => {
            let grid = world.grid_mut(kind);
            if let Some(a) = grid.key_at(at(x, y)) {
                grid.remove_connection(a, &ConnectionUse::indexed("PIN", pin)).unwrap();
            }
        }
    }
}

/// Stamp every model cell with a unique integer tag in `COUNT`.
fn tag_cells(world: &mut World) {
    let grid = world.grid(GridKind::Model);
    let keys: Vec<_> = grid.keys().collect();
    for (n, key) in keys.into_iter().enumerate() {
        let base = world.cell_mut(CellRef::grid(GridKind::Model, key)).unwrap();
        base.set(COUNT, Value::from(n as i64));
        base.transit();
    }
}

fn tag_at(world: &World, x: u32, y: u32) -> Option<i64> {
    let cell = world.resolve(GridPos::model(x as i32, y as i32).into());
    cell.get(COUNT, false).and_then(|v| v.get::<i64>().ok())
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any sequence of structural edits and rewiring leaves the grid valid.
    #[test]
    fn edits_keep_grid_consistent(w in 0..6u32, h in 0..6u32, ops in arb_edits(40)) {
        let mut world = World::new("main", Size::new(w, h), "bank", Size::new(1, 1));
        for op in &ops {
            apply(&mut world, op);
            prop_assert!(world.grid(GridKind::Model).validate().is_ok(), "after {:?}", op);
        }
    }

    /// Inserting a row moves every cell at or below it down by one and keeps
    /// its properties.
    #[test]
    fn insert_row_shifts_cells(w in 1..6u32, h in 1..6u32, k in 0..6u32) {
        prop_assume!(k <= h);
        let mut world = World::new("main", Size::new(w, h), "bank", Size::new(1, 1));
        tag_cells(&mut world);
        let before: Vec<Vec<Option<i64>>> = (0..h)
            .map(|y| (0..w).map(|x| tag_at(&world, x, y)).collect())
            .collect();
        world.insert_row(GridKind::Model, k).unwrap();
        for y in 0..h {
            let moved_to = if y < k { y } else { y + 1 };
            for x in 0..w {
                prop_assert_eq!(tag_at(&world, x, moved_to), before[y as usize][x as usize]);
            }
        }
        for x in 0..w {
            prop_assert_eq!(tag_at(&world, x, k), None);
        }
    }

    /// Removing a column drops exactly its cells and closes the gap.
    #[test]
    fn remove_column_closes_gap(w in 1..6u32, h in 1..6u32, k in 0..6u32) {
        prop_assume!(k < w);
        let mut world = World::new("main", Size::new(w, h), "bank", Size::new(1, 1));
        tag_cells(&mut world);
        let before: Vec<Vec<Option<i64>>> = (0..h)
            .map(|y| (0..w).map(|x| tag_at(&world, x, y)).collect())
            .collect();
        world.remove_column(GridKind::Model, k).unwrap();
        prop_assert_eq!(world.grid(GridKind::Model).size(), Size::new(w - 1, h));
        for y in 0..h {
            for x in 0..w - 1 {
                let from = if x < k { x } else { x + 1 };
                prop_assert_eq!(tag_at(&world, x, y), before[y as usize][from as usize]);
            }
        }
    }

    /// After one batch, a cell's flags are its old flags minus tired and
    /// halted bits, plus woken and started bits.
    #[test]
    fn batch_applies_clears_before_sets(
        initial in 0..4u8,
        requests in proptest::collection::vec(0..4u8, 0..8),
    ) {
        let mut keys: slotmap::SlotMap<CargoId, ()> = slotmap::SlotMap::with_key();
        let cell = CellRef::Cargo(keys.insert(()));
        let mut tab = ProcessTab::new();
        if initial & 1 != 0 { tab.wake(cell); }
        if initial & 2 != 0 { tab.start(cell); }
        tab.apply();
        let old = tab.flags(cell);

        let mut set = ProcessFlags::NONE;
        let mut cleared = ProcessFlags::NONE;
        for r in &requests {
            match r {
                0 => { tab.wake(cell); set = set | ProcessFlags::CYCLE; }
                1 => { tab.tire(cell); cleared = cleared | ProcessFlags::CYCLE; }
                2 => { tab.start(cell); set = set | ProcessFlags::MOVE; }
                _ => { tab.halt(cell); cleared = cleared | ProcessFlags::MOVE; }
            }
        }
        tab.apply();
        let flags = tab.flags(cell);
        for bit in [ProcessFlags::CYCLE, ProcessFlags::MOVE] {
            let expected = set.contains(bit) || (old.contains(bit) && !cleared.contains(bit));
            prop_assert_eq!(flags.contains(bit), expected);
        }
    }

    /// Saving, loading and saving again yields identical text.
    #[test]
    fn format_round_trip_is_stable(
        cells in proptest::collection::vec((0..5u32, 0..4u32, 0..3usize, -50..50i64), 0..12),
        wires in proptest::collection::vec((0..5u32, 0..4u32, 0..5u32, 0..4u32), 0..6),
    ) {
        let (parts, ids) = sample_registry();
        let mut model: Model = sample_model(5, 4);
        let mut tab = ProcessTab::new();
        for (x, y, kind, n) in &cells {
            let cell = model_cell(&model, *x as i32, *y as i32);
            let part = [ids.toggle, ids.counter, ids.lamp][*kind];
            place(&mut model, &parts, &mut tab, cell, part);
            let base = model.world.cell_mut(cell).unwrap();
            base.set(COUNT, Value::from(*n));
            base.transit();
        }
        for (n, (ax, ay, bx, by)) in wires.iter().enumerate() {
            let grid = model.world.grid_mut(GridKind::Model);
            let a = grid.key_at(at(*ax, *ay)).unwrap();
            let b = grid.key_at(at(*bx, *by)).unwrap();
            grid.add_connection(a, ConnectionUse::indexed("OUT", n as u32), b).unwrap();
        }

        let text = write_model(&model, &parts);
        let loaded = read_model(&text, &parts).unwrap();
        prop_assert_eq!(write_model(&loaded, &parts), text);
        prop_assert!(loaded.world.grid(GridKind::Model).validate().is_ok());
    }
}
