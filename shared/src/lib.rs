pub mod buffer;
pub mod commands;
pub mod opcodes;
pub mod wire;

pub use buffer::{BufferError, FrameBuffer};
pub use commands::client::ClientCommand;
pub use commands::server::ServerCommand;
pub use opcodes::{ClientOpcode, ServerOpcode};

/// Every map is this many cells wide. Coordinates are 1-based.
pub const MAP_WIDTH: u8 = 100;
/// Every map is this many cells tall. Coordinates are 1-based.
pub const MAP_HEIGHT: u8 = 100;

pub type MapId = u16;
pub type CharIndex = u16;

/// Facing direction. The numeric values are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Heading {
    North = 1,
    East = 2,
    #[default]
    South = 3,
    West = 4,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Heading::North, Heading::East, Heading::South, Heading::West];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Heading::North),
            2 => Some(Heading::East),
            3 => Some(Heading::South),
            4 => Some(Heading::West),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Offset of one step in this direction; `y` grows southwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Heading::North => (0, -1),
            Heading::East => (1, 0),
            Heading::South => (0, 1),
            Heading::West => (-1, 0),
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Heading::North),
            'E' => Some(Heading::East),
            'S' => Some(Heading::South),
            'W' => Some(Heading::West),
            _ => None,
        }
    }
}

/// A cell on a map, always inside `1..=MAP_WIDTH` x `1..=MAP_HEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

impl Position {
    pub fn new(x: u8, y: u8) -> Option<Self> {
        Self::from_coords(i32::from(x), i32::from(y))
    }

    pub fn from_coords(x: i32, y: i32) -> Option<Self> {
        if in_bounds(x, y) {
            Some(Self {
                x: x as u8,
                y: y as u8,
            })
        } else {
            None
        }
    }

    /// The neighbouring cell in `heading`, or `None` past the map edge.
    pub fn step(self, heading: Heading) -> Option<Self> {
        let (dx, dy) = heading.delta();
        Self::from_coords(i32::from(self.x) + dx, i32::from(self.y) + dy)
    }

    /// Row-major offset into a `MAP_WIDTH * MAP_HEIGHT` cell array.
    pub fn cell_index(self) -> usize {
        (usize::from(self.y) - 1) * usize::from(MAP_WIDTH) + (usize::from(self.x) - 1)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

pub fn in_bounds(x: i32, y: i32) -> bool {
    (1..=i32::from(MAP_WIDTH)).contains(&x) && (1..=i32::from(MAP_HEIGHT)).contains(&y)
}

/// Square spiral around a starting cell: the origin first, then `limit`
/// more candidates walking outwards. Candidates may fall outside the map;
/// callers filter them.
#[derive(Debug, Clone)]
pub struct Spiral {
    x: i32,
    y: i32,
    remaining: usize,
    run: i32,
    sign: i32,
    step_in_run: i32,
    vertical: bool,
    started: bool,
}

impl Spiral {
    pub fn new(x: i32, y: i32, limit: usize) -> Self {
        Self {
            x,
            y,
            remaining: limit,
            run: 1,
            sign: 1,
            step_in_run: 0,
            vertical: false,
            started: false,
        }
    }
}

impl Iterator for Spiral {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            return Some((self.x, self.y));
        }
        if self.remaining == 0 {
            return None;
        }

        if self.vertical {
            self.y += self.sign;
        } else {
            self.x += self.sign;
        }
        self.remaining -= 1;
        self.step_in_run += 1;

        if self.step_in_run == self.run {
            self.step_in_run = 0;
            if self.vertical {
                self.sign = -self.sign;
                self.run += 1;
            }
            self.vertical = !self.vertical;
        }

        Some((self.x, self.y))
    }
}
