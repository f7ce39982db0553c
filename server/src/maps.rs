//! Static map data: tile grids and the loaders that produce them.
//!
//! A [`TileGrid`] is immutable once loaded. The world keeps one per active
//! map and asks a [`MapLoader`] for it again if the map was evicted, so a
//! loader must return the same grid every time for the same id.
//!
//! [`MapFileLoader`] reads the classic three-file layout from a directory:
//! - `MapaN.map`: header, then per cell a flag byte, graphic layers and an
//!   optional trigger.
//! - `MapaN.inf`: header, then per cell a flag byte and optional exit, NPC
//!   and object records.
//! - `MapaN.dat`: optional INI with map name, music, start position and
//!   PvP flag.

use crate::error::LoadError;
use log::{debug, trace};
use shared::{BufferError, FrameBuffer, MapId, Position, MAP_HEIGHT, MAP_WIDTH};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const MAP_DESCRIPTION_LEN: usize = 255;
const MAP_HEADER_TAIL: usize = 8;
const INF_HEADER_LEN: usize = 10;

const FLAG_BLOCKED: u8 = 0x01;
const FLAG_LAYER_2: u8 = 0x02;
const FLAG_LAYER_3: u8 = 0x04;
const FLAG_LAYER_4: u8 = 0x08;
const FLAG_TRIGGER: u8 = 0x10;

const INF_EXIT: u8 = 0x01;
const INF_NPC: u8 = 0x02;
const INF_OBJECT: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapExit {
    pub map: MapId,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapObject {
    pub index: u16,
    pub amount: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tile {
    pub blocked: bool,
    pub layers: [u16; 4],
    pub trigger: u16,
    pub exit: Option<MapExit>,
    pub npc: Option<u16>,
    pub object: Option<MapObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapInfo {
    pub version: u16,
    pub description: String,
    pub name: String,
    pub music: u16,
    pub pk: bool,
    pub start: Option<(MapId, Position)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    info: MapInfo,
    tiles: Vec<Tile>,
}

impl TileGrid {
    /// A grid with no blocked tiles and no exits.
    pub fn open(info: MapInfo) -> Self {
        Self {
            info,
            tiles: vec![Tile::default(); usize::from(MAP_WIDTH) * usize::from(MAP_HEIGHT)],
        }
    }

    pub fn info(&self) -> &MapInfo {
        &self.info
    }

    pub fn tile(&self, pos: Position) -> &Tile {
        &self.tiles[pos.cell_index()]
    }

    pub fn tile_mut(&mut self, pos: Position) -> &mut Tile {
        &mut self.tiles[pos.cell_index()]
    }

    pub fn is_blocked(&self, pos: Position) -> bool {
        self.tile(pos).blocked
    }

    pub fn with_blocked(mut self, pos: Position) -> Self {
        self.tile_mut(pos).blocked = true;
        self
    }

    pub fn with_exit(mut self, pos: Position, exit: MapExit) -> Self {
        self.tile_mut(pos).exit = Some(exit);
        self
    }
}

/// Source of static map data. Loads may run on a worker thread.
pub trait MapLoader: Send + Sync {
    fn load(&self, map: MapId) -> Result<TileGrid, LoadError>;
}

/// Reads `MapaN.map` / `MapaN.inf` / `MapaN.dat` from a base directory.
#[derive(Debug, Clone)]
pub struct MapFileLoader {
    base: PathBuf,
}

impl MapFileLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn path(&self, map: MapId, extension: &str) -> PathBuf {
        self.base.join(format!("Mapa{}.{}", map, extension))
    }

    fn read(&self, map: MapId, path: &Path) -> Result<Vec<u8>, LoadError> {
        std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(map)
            } else {
                LoadError::Io {
                    map,
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }
}

impl MapLoader for MapFileLoader {
    fn load(&self, map: MapId) -> Result<TileGrid, LoadError> {
        let map_bytes = self.read(map, &self.path(map, "map"))?;
        let inf_bytes = self.read(map, &self.path(map, "inf"))?;

        let mut grid = parse_tiles(&map_bytes, &inf_bytes)
            .map_err(|e| LoadError::Corrupt { map, detail: e.to_string() })?;

        let dat_path = self.path(map, "dat");
        match std::fs::read(&dat_path) {
            Ok(raw) => apply_dat(&mut grid.info, map, &shared::buffer::decode_latin1(&raw)),
            Err(_) => debug!("Map {} has no {}", map, dat_path.display()),
        }

        trace!("Map {} parsed ({} bytes map, {} bytes inf)", map, map_bytes.len(), inf_bytes.len());
        Ok(grid)
    }
}

/// Decodes the `.map` and `.inf` byte layouts into a grid.
pub fn parse_tiles(map_bytes: &[u8], inf_bytes: &[u8]) -> Result<TileGrid, BufferError> {
    let mut map = FrameBuffer::from_bytes(map_bytes);
    let mut inf = FrameBuffer::from_bytes(inf_bytes);

    let info = MapInfo {
        version: map.read_u16()?,
        description: map.read_fixed_string(MAP_DESCRIPTION_LEN)?,
        ..MapInfo::default()
    };
    let _crc = map.read_i32()?;
    let _magic = map.read_i32()?;
    map.skip(MAP_HEADER_TAIL)?;
    inf.skip(INF_HEADER_LEN)?;

    let mut grid = TileGrid::open(info);
    for y in 1..=MAP_HEIGHT {
        for x in 1..=MAP_WIDTH {
            let pos = Position { x, y };
            let tile = grid.tile_mut(pos);

            let flags = map.read_u8()?;
            tile.blocked = flags & FLAG_BLOCKED != 0;
            tile.layers[0] = map.read_u16()?;
            for (layer, bit) in [(1, FLAG_LAYER_2), (2, FLAG_LAYER_3), (3, FLAG_LAYER_4)] {
                if flags & bit != 0 {
                    tile.layers[layer] = map.read_u16()?;
                }
            }
            if flags & FLAG_TRIGGER != 0 {
                tile.trigger = map.read_u16()?;
            }

            let flags = inf.read_u8()?;
            if flags & INF_EXIT != 0 {
                let target = inf.read_u16()?;
                let ex = inf.read_u16()?;
                let ey = inf.read_u16()?;
                tile.exit = exit_target(target, ex, ey);
            }
            if flags & INF_NPC != 0 {
                tile.npc = Some(inf.read_u16()?);
            }
            if flags & INF_OBJECT != 0 {
                tile.object = Some(MapObject {
                    index: inf.read_u16()?,
                    amount: inf.read_u16()?,
                });
            }
        }
    }
    Ok(grid)
}

fn exit_target(map: u16, x: u16, y: u16) -> Option<MapExit> {
    if map == 0 {
        return None;
    }
    let pos = Position::from_coords(i32::from(x), i32::from(y))?;
    Some(MapExit { map, pos })
}

/// Applies the `[MapaN]` section of a `.dat` file. Unknown keys and
/// unparsable values are ignored.
fn apply_dat(info: &mut MapInfo, map: MapId, text: &str) {
    let wanted = format!("mapa{}", map);
    let mut in_section = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            in_section = section.trim().eq_ignore_ascii_case(&wanted);
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => info.name = value.to_string(),
            "musicnum" => info.music = value.parse().unwrap_or(0),
            "pk" => info.pk = value == "1",
            "startpos" => info.start = parse_start_pos(value),
            _ => {}
        }
    }
}

/// `"map-x-y"`.
fn parse_start_pos(value: &str) -> Option<(MapId, Position)> {
    let mut parts = value.split('-').map(|p| p.trim().parse::<i32>());
    let map = MapId::try_from(parts.next()?.ok()?).ok()?;
    let x = parts.next()?.ok()?;
    let y = parts.next()?.ok()?;
    Some((map, Position::from_coords(x, y)?))
}

/// In-memory loader for tests and tools. Counts how often each map is
/// loaded.
#[derive(Debug, Default)]
pub struct MemoryMapLoader {
    grids: HashMap<MapId, TileGrid>,
    failing: HashSet<MapId>,
    loads: Mutex<HashMap<MapId, usize>>,
}

impl MemoryMapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `1..=count`, all open.
    pub fn open_maps(count: MapId) -> Self {
        let mut loader = Self::new();
        for map in 1..=count {
            loader.grids.insert(
                map,
                TileGrid::open(MapInfo {
                    name: format!("Map {}", map),
                    ..MapInfo::default()
                }),
            );
        }
        loader
    }

    pub fn with_map(mut self, map: MapId, grid: TileGrid) -> Self {
        self.grids.insert(map, grid);
        self
    }

    pub fn with_failing(mut self, map: MapId) -> Self {
        self.failing.insert(map);
        self
    }

    pub fn load_count(&self, map: MapId) -> usize {
        match self.loads.lock() {
            Ok(loads) => loads.get(&map).copied().unwrap_or(0),
            Err(_) => 0,
        }
    }
}

impl MapLoader for MemoryMapLoader {
    fn load(&self, map: MapId) -> Result<TileGrid, LoadError> {
        if let Ok(mut loads) = self.loads.lock() {
            *loads.entry(map).or_insert(0) += 1;
        }
        if self.failing.contains(&map) {
            return Err(LoadError::Corrupt {
                map,
                detail: "configured to fail".to_string(),
            });
        }
        self.grids.get(&map).cloned().ok_or(LoadError::NotFound(map))
    }
}
