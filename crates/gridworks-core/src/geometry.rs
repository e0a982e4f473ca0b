//! Plain geometric payloads shared by cells, values and the persisted format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// An integer cell coordinate. `y` grows downwards (row index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring coordinate one step in `dir`.
    pub fn step(self, dir: Direction) -> Coord {
        let (dx, dy) = dir.offset();
        Coord::new(self.x + dx, self.y + dy)
    }

    /// Converts to the continuous coordinate of the cell centre.
    pub fn to_f(self) -> CoordF {
        CoordF::new(self.x as f64, self.y as f64)
    }
}

impl Add for Coord {
    type Output = Coord;

    fn add(self, rhs: Coord) -> Coord {
        Coord::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Coord {
    type Output = Coord;

    fn sub(self, rhs: Coord) -> Coord {
        Coord::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// A continuous coordinate in cell units. Cell `(x, y)` spans
/// `[x - 0.5, x + 0.5) x [y - 0.5, y + 0.5)`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct CoordF {
    pub x: f64,
    pub y: f64,
}

impl CoordF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The cell whose unit square contains this point.
    pub fn cell(self) -> Coord {
        Coord::new(self.x.round() as i32, self.y.round() as i32)
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl Add for CoordF {
    type Output = CoordF;

    fn add(self, rhs: CoordF) -> CoordF {
        CoordF::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for CoordF {
    type Output = CoordF;

    fn sub(self, rhs: CoordF) -> CoordF {
        CoordF::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for CoordF {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Width and height of a grid, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, at: Coord) -> bool {
        at.x >= 0 && at.y >= 0 && (at.x as u32) < self.width && (at.y as u32) < self.height
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// A compass direction. Only the four cardinals address neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// The four cardinal directions, in neighbour-slot order.
    pub const CARDINALS: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Offset for this direction.
    pub fn offset(&self) -> (i32, i32) {
        match self {
            Direction::None => (0, 0),
            Direction::North => (0, -1),
            Direction::NorthEast => (1, -1),
            Direction::East => (1, 0),
            Direction::SouthEast => (1, 1),
            Direction::South => (0, 1),
            Direction::SouthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::NorthWest => (-1, -1),
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::None => Direction::None,
            Direction::North => Direction::South,
            Direction::NorthEast => Direction::SouthWest,
            Direction::East => Direction::West,
            Direction::SouthEast => Direction::NorthWest,
            Direction::South => Direction::North,
            Direction::SouthWest => Direction::NorthEast,
            Direction::West => Direction::East,
            Direction::NorthWest => Direction::SouthEast,
        }
    }

    pub fn is_cardinal(&self) -> bool {
        self.cardinal_slot().is_some()
    }

    /// Neighbour slot index for a cardinal direction, `None` otherwise.
    pub fn cardinal_slot(&self) -> Option<usize> {
        match self {
            Direction::North => Some(0),
            Direction::East => Some(1),
            Direction::South => Some(2),
            Direction::West => Some(3),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::None => "none",
            Direction::North => "north",
            Direction::NorthEast => "northeast",
            Direction::East => "east",
            Direction::SouthEast => "southeast",
            Direction::South => "south",
            Direction::SouthWest => "southwest",
            Direction::West => "west",
            Direction::NorthWest => "northwest",
        }
    }

    pub fn from_name(name: &str) -> Option<Direction> {
        let dir = match name {
            "none" => Direction::None,
            "north" => Direction::North,
            "northeast" => Direction::NorthEast,
            "east" => Direction::East,
            "southeast" => Direction::SouthEast,
            "south" => Direction::South,
            "southwest" => Direction::SouthWest,
            "west" => Direction::West,
            "northwest" => Direction::NorthWest,
            _ => return None,
        };
        Some(dir)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// An RGBA colour, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parses `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(text: &str) -> Option<Color> {
        let hex = text.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Color::rgba(channel(0)?, channel(2)?, channel(4)?, 255)),
            8 => Some(Color::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for dir in [
            Direction::None,
            Direction::North,
            Direction::NorthEast,
            Direction::East,
            Direction::SouthEast,
            Direction::South,
            Direction::SouthWest,
            Direction::West,
            Direction::NorthWest,
        ] {
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn only_cardinals_have_slots() {
        assert_eq!(Direction::North.cardinal_slot(), Some(0));
        assert_eq!(Direction::West.cardinal_slot(), Some(3));
        assert!(Direction::NorthEast.cardinal_slot().is_none());
        assert!(Direction::None.cardinal_slot().is_none());
    }

    #[test]
    fn coord_step_follows_offset() {
        let c = Coord::new(2, 2);
        assert_eq!(c.step(Direction::North), Coord::new(2, 1));
        assert_eq!(c.step(Direction::SouthWest), Coord::new(1, 3));
    }

    #[test]
    fn coordf_rounds_to_cell() {
        assert_eq!(CoordF::new(0.49, 1.5).cell(), Coord::new(0, 2));
        assert_eq!(CoordF::new(-0.2, 2.2).cell(), Coord::new(0, 2));
    }

    #[test]
    fn color_hex_round_trip() {
        let c = Color::rgba(255, 0, 16, 128);
        assert_eq!(c.to_string(), "#ff001080");
        assert_eq!(Color::from_hex("#ff001080"), Some(c));
        assert_eq!(Color::from_hex("#ff0010"), Some(Color::rgba(255, 0, 16, 255)));
        assert_eq!(Color::from_hex("ff0010"), None);
        assert_eq!(Color::from_hex("#ff00"), None);
    }

    #[test]
    fn size_contains() {
        let s = Size::new(3, 2);
        assert!(s.contains(Coord::new(2, 1)));
        assert!(!s.contains(Coord::new(3, 0)));
        assert!(!s.contains(Coord::new(-1, 0)));
        assert_eq!(s.area(), 6);
    }
}
