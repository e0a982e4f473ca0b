//! Line-oriented text persistence of a [`Model`].
//!
//! ```text
//! simulation 1
//! name "Blinker"
//! locked false
//! grid model "main" 4x3
//! grid bank "parts" 2x1
//! gcell
//! at model 1,2
//! part toggle
//! prop state bool:true
//! wire OUT[0] 2,2
//! end
//! ccell
//! at model 0.5,1.25
//! size 0.3
//! part crate
//! prop weight int:3
//! end
//! ```
//!
//! `#` starts a comment line; blank lines are ignored. Only persistent
//! properties with a text form are written. Loading never touches a live
//! model: the result is a fresh [`Model`] the caller swaps in.

use crate::cell::{CargoCell, MAX_CARGO_RADIUS};
use crate::geometry::{Coord, CoordF, Size};
use crate::grid::{MAX_GRID_CELLS, size_fits};
use crate::id::{CellRef, ConnectionUse, ConnectionUseParseError, GridKind, PartId, PropertyId};
use crate::model::{Model, ModelInfo};
use crate::part::{Part, PartRegistry};
use crate::value::{Value, quote, unquote};
use crate::world::World;
use std::fmt::Write as _;
use std::sync::Arc;

/// Version written in the `simulation` header.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// A malformed cell block.
    #[error("line {line}: bad cell: {reason}")]
    Cell { line: usize, reason: String },
    /// A malformed header or grid line.
    #[error("line {line}: bad model: {reason}")]
    Model { line: usize, reason: String },
}

fn cell_err(line: usize, reason: impl Into<String>) -> FormatError {
    FormatError::Cell {
        line,
        reason: reason.into(),
    }
}

fn model_err(line: usize, reason: impl Into<String>) -> FormatError {
    FormatError::Model {
        line,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Render `model` as text. Cells of the empty part without wires or
/// properties are omitted.
pub fn write_model(model: &Model, parts: &PartRegistry) -> String {
    let mut out = String::new();
    let info = &model.info;
    // Writing to a String cannot fail.
    let _ = writeln!(out, "simulation {FORMAT_VERSION}");
    let _ = writeln!(out, "name {}", quote(&info.title));
    let _ = writeln!(out, "author {}", quote(&info.author));
    let _ = writeln!(out, "version {}", quote(&info.version));
    let _ = writeln!(out, "description {}", quote(&info.description));
    let _ = writeln!(out, "locked {}", !info.editable);
    for kind in GridKind::ALL {
        let grid = model.world.grid(kind);
        let _ = writeln!(out, "grid {kind} {} {}", quote(grid.name()), grid.size());
    }

    for kind in GridKind::ALL {
        let grid = model.world.grid(kind);
        for (_, cell) in grid.iter() {
            let part = parts.get(cell.base().part());
            let props = property_lines(cell.base().committed(), part.map(|p| &**p), parts);
            if cell.base().part() == PartId::EMPTY && props.is_empty() && cell.connections().is_empty() {
                continue;
            }
            let Some(part) = part else {
                tracing::debug!(at = %cell.position(), "cell of an unregistered part not saved");
                continue;
            };
            out.push_str("gcell\n");
            let _ = writeln!(out, "at {kind} {}", cell.position());
            let _ = writeln!(out, "part {}", part.name());
            for line in props {
                out.push_str(&line);
            }
            for (use_, target) in cell.connections() {
                if let Some(t) = grid.cell(*target) {
                    let _ = writeln!(out, "wire {use_} {}", t.position());
                }
            }
            out.push_str("end\n");
        }
    }

    for (_, cargo) in model.world.cargo() {
        let Some(part) = parts.get(cargo.base().part()) else {
            continue;
        };
        out.push_str("ccell\n");
        let _ = writeln!(out, "at {} {}", cargo.grid(), cargo.position());
        let _ = writeln!(out, "size {}", cargo.radius());
        let _ = writeln!(out, "part {}", part.name());
        for line in property_lines(cargo.base().committed(), Some(part), parts) {
            out.push_str(&line);
        }
        out.push_str("end\n");
    }
    out
}

fn property_lines<'a>(
    props: impl Iterator<Item = (PropertyId, &'a Value)>,
    part: Option<&Part>,
    parts: &PartRegistry,
) -> Vec<String> {
    let mut lines = Vec::new();
    for (id, value) in props {
        let entry = part.and_then(|p| p.entry(id));
        if entry.is_some_and(|e| !e.policy.persistent) {
            continue;
        }
        let Some(text) = value.to_text(parts) else {
            tracing::debug!(property = id.0, tag = %value.tag(), "value has no text form, not saved");
            continue;
        };
        match entry {
            Some(e) => lines.push(format!("prop {} {text}\n", e.name)),
            None => lines.push(format!("prop {} {text}\n", id.0)),
        }
    }
    lines
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CellBlock {
    line: usize,
    cargo: bool,
    at: Option<(GridKind, String, usize)>,
    part: Option<(Arc<Part>, PartId)>,
    size: Option<f64>,
    props: Vec<(PropertyId, Value)>,
    wires: Vec<(ConnectionUse, Coord, usize)>,
}

struct GridLine {
    name: String,
    size: Size,
}

/// Parse a model saved by [`write_model`].
pub fn read_model(text: &str, parts: &PartRegistry) -> Result<Model, FormatError> {
    let mut info = ModelInfo::default();
    let mut grids: [Option<GridLine>; 2] = [None, None];
    let mut blocks: Vec<CellBlock> = Vec::new();
    let mut open: Option<CellBlock> = None;
    let mut seen_header = false;
    let mut last = 0;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        last = line;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (word, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        let rest = rest.trim();

        if !seen_header {
            if word != "simulation" {
                return Err(model_err(line, "expected `simulation` header"));
            }
            let version: u32 = rest.parse().map_err(|_| model_err(line, "bad format version"))?;
            if version != FORMAT_VERSION {
                return Err(model_err(line, format!("unsupported format version {version}")));
            }
            seen_header = true;
            continue;
        }

        if let Some(block) = open.as_mut() {
            if word == "end" {
                if let Some(block) = open.take() {
                    blocks.push(block);
                }
                continue;
            }
            parse_cell_line(block, word, rest, line, parts)?;
            continue;
        }

        match word {
            "name" | "author" | "version" | "description" => {
                let value = unquote(rest).ok_or_else(|| model_err(line, format!("bad {word} string")))?;
                match word {
                    "name" => info.title = value,
                    "author" => info.author = value,
                    "version" => info.version = value,
                    _ => info.description = value,
                }
            }
            "locked" => {
                let locked: bool = rest.parse().map_err(|_| model_err(line, "bad locked flag"))?;
                info.editable = !locked;
            }
            "grid" => {
                let (kind, rest) = rest.split_once(' ').ok_or_else(|| model_err(line, "bad grid line"))?;
                let kind = GridKind::from_name(kind).ok_or_else(|| model_err(line, "unknown grid"))?;
                let (name, size) = split_quoted(rest.trim()).ok_or_else(|| model_err(line, "bad grid name"))?;
                let size = parse_size(size).ok_or_else(|| model_err(line, "bad grid size"))?;
                if !size_fits(size) {
                    return Err(model_err(line, format!("{size} grid exceeds {MAX_GRID_CELLS} cells")));
                }
                let slot = &mut grids[kind as usize];
                if slot.is_some() {
                    return Err(model_err(line, format!("{kind} grid declared twice")));
                }
                *slot = Some(GridLine { name, size });
            }
            "gcell" | "ccell" => {
                open = Some(CellBlock {
                    line,
                    cargo: word == "ccell",
                    at: None,
                    part: None,
                    size: None,
                    props: Vec::new(),
                    wires: Vec::new(),
                });
            }
            other => return Err(model_err(line, format!("unexpected `{other}`"))),
        }
    }

    if !seen_header {
        return Err(model_err(last.max(1), "empty model"));
    }
    if let Some(block) = open {
        return Err(cell_err(block.line, "block is missing `end`"));
    }
    let [model_grid, bank_grid] = grids;
    let model_grid = model_grid.ok_or_else(|| model_err(last, "missing model grid"))?;
    let bank_grid = bank_grid.unwrap_or(GridLine {
        name: "bank".to_string(),
        size: Size::default(),
    });

    let mut world = World::new(&model_grid.name, model_grid.size, &bank_grid.name, bank_grid.size);
    build_cells(&mut world, &blocks)?;
    Ok(Model { world, info })
}

fn parse_cell_line(block: &mut CellBlock, word: &str, rest: &str, line: usize, parts: &PartRegistry) -> Result<(), FormatError> {
    match word {
        "at" => {
            let (kind, pos) = rest.split_once(' ').ok_or_else(|| cell_err(line, "bad position"))?;
            let kind = GridKind::from_name(kind).ok_or_else(|| cell_err(line, "unknown grid"))?;
            block.at = Some((kind, pos.trim().to_string(), line));
        }
        "part" => {
            let id = parts
                .id_of(rest)
                .ok_or_else(|| cell_err(line, format!("unknown part {rest:?}")))?;
            let part = parts.get(id).ok_or_else(|| cell_err(line, "unknown part"))?;
            block.part = Some((Arc::clone(part), id));
        }
        "size" if block.cargo => {
            let r: f64 = rest.parse().map_err(|_| cell_err(line, "bad size"))?;
            if !(0.0..=MAX_CARGO_RADIUS).contains(&r) {
                return Err(cell_err(line, format!("size must be within 0..={MAX_CARGO_RADIUS}")));
            }
            block.size = Some(r);
        }
        "prop" => {
            let (part, _) = block
                .part
                .as_ref()
                .ok_or_else(|| cell_err(line, "`prop` before `part`"))?;
            let (key, text) = rest.split_once(' ').ok_or_else(|| cell_err(line, "bad property"))?;
            let id = match part.entry_by_name(key) {
                Some(entry) => entry.id,
                None => PropertyId(
                    key.parse()
                        .map_err(|_| cell_err(line, format!("unknown property {key:?}")))?,
                ),
            };
            let value = Value::parse(text.trim(), parts).map_err(|e| cell_err(line, e.to_string()))?;
            block.props.push((id, value));
        }
        "wire" if !block.cargo => {
            let (use_, target) = rest.split_once(' ').ok_or_else(|| cell_err(line, "bad wire"))?;
            let use_: ConnectionUse = use_.parse().map_err(|e: ConnectionUseParseError| cell_err(line, e.to_string()))?;
            let target = parse_coord(target.trim()).ok_or_else(|| cell_err(line, "bad wire target"))?;
            block.wires.push((use_, target, line));
        }
        other => return Err(cell_err(line, format!("unexpected `{other}`"))),
    }
    Ok(())
}

fn build_cells(world: &mut World, blocks: &[CellBlock]) -> Result<(), FormatError> {
    let mut wires = Vec::new();
    for block in blocks {
        let (kind, pos, at_line) = block
            .at
            .as_ref()
            .ok_or_else(|| cell_err(block.line, "missing `at`"))?;
        let (part, part_id) = block
            .part
            .as_ref()
            .ok_or_else(|| cell_err(block.line, "missing `part`"))?;

        let cell = if block.cargo {
            let at = parse_coordf(pos)
                .filter(|at| at.x.is_finite() && at.y.is_finite())
                .ok_or_else(|| cell_err(*at_line, "bad cargo position"))?;
            let radius = block.size.unwrap_or(part.cargo_radius());
            let id = world.spawn_cargo(CargoCell::new(*part_id, *kind, at, radius));
            CellRef::Cargo(id)
        } else {
            let at = parse_coord(pos).ok_or_else(|| cell_err(*at_line, "bad position"))?;
            let key = world
                .grid(*kind)
                .key_at(at)
                .ok_or_else(|| cell_err(*at_line, format!("{at} is outside the {kind} grid")))?;
            let cell = CellRef::grid(*kind, key);
            if world.cell(cell).part() != PartId::EMPTY || world.cell(cell).committed().next().is_some() {
                return Err(cell_err(block.line, format!("{kind} cell {at} defined twice")));
            }
            for (use_, target, line) in &block.wires {
                wires.push((*kind, key, use_.clone(), *target, *line));
            }
            cell
        };

        world.set_part(cell, *part_id);
        if let Some(base) = world.cell_mut(cell) {
            for entry in part.properties() {
                base.set(entry.id, entry.default.clone());
            }
            for (id, value) in &block.props {
                base.set(*id, value.clone());
            }
            base.transit();
        }
    }

    for (kind, source, use_, target, line) in wires {
        let grid = world.grid_mut(kind);
        let target = grid
            .key_at(target)
            .ok_or_else(|| cell_err(line, format!("wire target {target} is outside the grid")))?;
        grid.add_connection(source, use_, target)
            .map_err(|e| cell_err(line, e.to_string()))?;
    }
    Ok(())
}

/// Split a leading quoted string off `s`.
fn split_quoted(s: &str) -> Option<(String, &str)> {
    if !s.starts_with('"') {
        return None;
    }
    let mut escaped = false;
    for (i, c) in s.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                let name = unquote(&s[..=i])?;
                return Some((name, s[i + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

fn parse_size(s: &str) -> Option<Size> {
    let (w, h) = s.split_once('x')?;
    Some(Size::new(w.parse().ok()?, h.parse().ok()?))
}

fn parse_coord(s: &str) -> Option<Coord> {
    let (x, y) = s.split_once(',')?;
    Some(Coord::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

fn parse_coordf(s: &str) -> Option<CoordF> {
    let (x, y) = s.split_once(',')?;
    Some(CoordF::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CellProxy, Context};
    use crate::id::GridPos;
    use crate::process_tab::ProcessTab;
    use crate::test_utils::*;

    fn sample() -> (Model, PartRegistry, SampleParts) {
        let (parts, ids) = sample_registry();
        let mut model = sample_model(4, 3);
        let mut tab = ProcessTab::new();
        model.info = ModelInfo {
            title: "Blinker \"demo\"".into(),
            author: "Someone".into(),
            version: "1.0".into(),
            description: "two lines\nof text".into(),
            editable: false,
        };
        let toggle = model_cell(&model, 1, 2);
        let lamp = model_cell(&model, 2, 2);
        place(&mut model, &parts, &mut tab, toggle, ids.toggle);
        place(&mut model, &parts, &mut tab, lamp, ids.lamp);
        let mut ctx = Context::new();
        let mut proxy = CellProxy::new(&model.world, &parts, &mut ctx, toggle);
        proxy.set(STATE, true);
        proxy.connect(ConnectionUse::indexed("OUT", 0), Coord::new(2, 2));
        proxy.spawn_cargo(ids.crate_, CoordF::new(0.5, 1.25));
        ctx.commit(&mut model, &parts, &mut tab);
        (model, parts, ids)
    }

    #[test]
    fn round_trip_preserves_cells_wires_and_cargo() {
        let (model, parts, ids) = sample();
        let text = write_model(&model, &parts);
        let loaded = read_model(&text, &parts).unwrap();
        assert_eq!(write_model(&loaded, &parts), text);

        assert_eq!(loaded.info, model.info);
        let toggle = loaded.world.resolve(GridPos::model(1, 2).into());
        assert_eq!(toggle.part(), ids.toggle);
        assert_eq!(toggle.get(STATE, false), Some(&Value::from(true)));
        let grid = loaded.world.grid(GridKind::Model);
        let wired = grid.cell_at(Coord::new(1, 2)).unwrap().connection(&ConnectionUse::new("OUT"));
        assert_eq!(wired, grid.key_at(Coord::new(2, 2)));
        grid.validate().unwrap();

        let (_, cargo) = loaded.world.cargo().iter().next().unwrap();
        assert_eq!(cargo.position(), CoordF::new(0.5, 1.25));
        assert_eq!(cargo.radius(), 0.3);
        assert_eq!(cargo.base().get(WEIGHT, false), Some(&Value::from(1i64)));
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let (parts, ids) = sample_registry();
        let text = "\n# saved by hand\nsimulation 1\n\ngrid model \"main\" 2x2\ngcell\nat model 1,1\npart counter\nprop count int:41\nend\n";
        let model = read_model(text, &parts).unwrap();
        let cell = model.world.resolve(GridPos::model(1, 1).into());
        assert_eq!(cell.part(), ids.counter);
        assert_eq!(cell.get(COUNT, false), Some(&Value::from(41i64)));
        assert_eq!(model.world.grid(GridKind::Bank).size(), Size::default());
    }

    #[test]
    fn numeric_property_ids_are_accepted() {
        let (parts, _) = sample_registry();
        let text = "simulation 1\ngrid model \"m\" 1x1\ngcell\nat model 0,0\npart counter\nprop 1 int:3\nprop 9 str:\"extra\"\nend\n";
        let model = read_model(text, &parts).unwrap();
        let cell = model.world.resolve(GridPos::model(0, 0).into());
        assert_eq!(cell.get(COUNT, false), Some(&Value::from(3i64)));
        assert_eq!(cell.get(PropertyId(9), false), Some(&Value::from("extra")));
    }

    #[test]
    fn bad_headers_are_model_errors() {
        let (parts, _) = sample_registry();
        let cases = [
            ("grid model \"m\" 1x1\n", 1),
            ("simulation 2\n", 1),
            ("simulation 1\ngrid attic \"m\" 1x1\n", 2),
            ("simulation 1\ngrid model m 1x1\n", 2),
            ("simulation 1\ngrid model \"m\" 1by1\n", 2),
            ("simulation 1\nlocked maybe\n", 2),
            ("simulation 1\nbogus\n", 2),
            ("simulation 1\ngrid model \"m\" 4294967295x4294967295\n", 2),
            ("simulation 1\ngrid model \"m\" 65536x65536\n", 2),
        ];
        for (text, line) in cases {
            match read_model(text, &parts) {
                Err(FormatError::Model { line: l, .. }) => assert_eq!(l, line, "{text:?}"),
                other => panic!("{text:?} gave {other:?}"),
            }
        }
    }

    #[test]
    fn stray_cargo_loads_without_overlays() {
        let (parts, _) = sample_registry();
        let text = "simulation 1\ngrid model \"m\" 2x2\nccell\nat model 3e9,-7\npart crate\nsize 64\nend\n";
        let model = read_model(text, &parts).unwrap();
        let (_, cargo) = model.world.cargo().iter().next().unwrap();
        assert_eq!(cargo.position(), CoordF::new(3.0e9, -7.0));
        for (_, cell) in model.world.grid(GridKind::Model).iter() {
            assert!(cell.overlays().is_empty());
        }
    }

    #[test]
    fn bad_cells_are_cell_errors() {
        let (parts, _) = sample_registry();
        let head = "simulation 1\ngrid model \"m\" 2x2\n";
        let cases = [
            ("gcell\nat model 5,5\npart counter\nend\n", 4),
            ("gcell\nat model 0,0\npart nothing\nend\n", 5),
            ("gcell\nat model 0,0\nprop count int:1\nend\n", 5),
            ("gcell\nat model 0,0\npart counter\nprop count frob:1\nend\n", 6),
            ("gcell\nat model 0,0\npart counter\n", 3),
            ("gcell\npart counter\nend\n", 3),
            ("gcell\nat model 0,0\npart counter\nwire OUT 7,7\nend\n", 6),
            ("gcell\nat model 0,0\npart counter\nend\ngcell\nat model 0,0\npart counter\nend\n", 7),
            ("ccell\nat model NaN,1\npart crate\nend\n", 4),
            ("ccell\nat model 1,1\npart crate\nsize 3000\nend\n", 6),
            ("ccell\nat model 1,1\npart crate\nsize -1\nend\n", 6),
            ("ccell\nat model 1,1\npart crate\nsize inf\nend\n", 6),
        ];
        for (body, line) in cases {
            let text = format!("{head}{body}");
            match read_model(&text, &parts) {
                Err(FormatError::Cell { line: l, .. }) => assert_eq!(l, line, "{body:?}"),
                other => panic!("{body:?} gave {other:?}"),
            }
        }
    }

    #[test]
    fn transient_and_opaque_values_are_not_written() {
        let (mut parts, _) = sample_registry();
        let scratch = parts
            .register(
                Part::builder("scratchpad")
                    .property(crate::part::PropertyEntry::new(0, "memo", 0i64).transient())
                    .build(),
            )
            .unwrap();
        let mut model = sample_model(1, 1);
        let cell = model_cell(&model, 0, 0);
        let mut tab = ProcessTab::new();
        place(&mut model, &parts, &mut tab, cell, scratch);
        let base = model.world.cell_mut(cell).unwrap();
        base.set(PropertyId(1), Value::any(vec![1u8]));
        base.transit();
        let text = write_model(&model, &parts);
        assert!(text.contains("part scratchpad"));
        assert!(!text.contains("prop"));
    }
}
