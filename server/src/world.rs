//! The world map set: active maps, their occupancy grids, and every
//! operation that moves a player onto, across or off a map.
//!
//! Maps are loaded on first use. In lazy mode the load itself happens
//! elsewhere: [`WorldMapSet::request`] queues the id, the caller fetches the
//! queue with [`WorldMapSet::take_load_requests`], runs the loader off the
//! event loop and hands the result back through
//! [`WorldMapSet::complete_load`]. Operations that need a map that is not
//! loaded fail with [`WorldError::MapNotLoaded`] before touching any state.
//!
//! Occupancy invariant: for every player on a map, the cell at the
//! player's `pos` holds that player's index, and no other cell does.

use crate::connection::ConnectionId;
use crate::error::{LoadError, WorldError};
use crate::maps::{MapLoader, TileGrid};
use crate::outbox::Outbox;
use crate::registry::Registry;
use log::{debug, error, info, warn};
use rand::seq::SliceRandom;
use shared::commands::server::{ChangeMap, CharacterMove, CharacterRemove};
use shared::{CharIndex, Heading, MapId, Position, ServerCommand, Spiral, MAP_HEIGHT, MAP_WIDTH};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// How many cells around the target the landing search tries.
const LANDING_SEARCH_LIMIT: usize = 100;

/// One loaded map.
#[derive(Debug)]
pub struct GameMap {
    id: MapId,
    grid: TileGrid,
    occupancy: Vec<Option<CharIndex>>,
    players: BTreeMap<CharIndex, ConnectionId>,
}

impl GameMap {
    pub fn new(id: MapId, grid: TileGrid) -> Self {
        Self {
            id,
            grid,
            occupancy: vec![None; usize::from(MAP_WIDTH) * usize::from(MAP_HEIGHT)],
            players: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> MapId {
        self.id
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn occupant(&self, pos: Position) -> Option<CharIndex> {
        self.occupancy[pos.cell_index()]
    }

    pub fn is_free(&self, pos: Position) -> bool {
        !self.grid.is_blocked(pos) && self.occupant(pos).is_none()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn players(&self) -> Vec<CharIndex> {
        self.players.keys().copied().collect()
    }

    pub fn contains(&self, index: CharIndex) -> bool {
        self.players.contains_key(&index)
    }

    /// Connections of everyone on the map, optionally leaving one out.
    pub fn audience(&self, except: Option<CharIndex>) -> Vec<ConnectionId> {
        self.players
            .iter()
            .filter(|(index, _)| Some(**index) != except)
            .map(|(_, connection)| *connection)
            .collect()
    }

    /// Nearest free cell to `target`, searching outwards in a spiral.
    pub fn find_free_near(&self, target: Position) -> Option<Position> {
        Spiral::new(i32::from(target.x), i32::from(target.y), LANDING_SEARCH_LIMIT)
            .filter_map(|(x, y)| Position::from_coords(x, y))
            .find(|pos| self.is_free(*pos))
    }

    /// Every occupied cell as (position, occupant).
    pub fn occupied_cells(&self) -> Vec<(Position, CharIndex)> {
        let mut cells = Vec::new();
        for y in 1..=MAP_HEIGHT {
            for x in 1..=MAP_WIDTH {
                let pos = Position { x, y };
                if let Some(index) = self.occupant(pos) {
                    cells.push((pos, index));
                }
            }
        }
        cells
    }

    fn place(&mut self, index: CharIndex, connection: ConnectionId, pos: Position) {
        self.occupancy[pos.cell_index()] = Some(index);
        self.players.insert(index, connection);
    }

    fn remove(&mut self, index: CharIndex, pos: Position) -> bool {
        let cell = &mut self.occupancy[pos.cell_index()];
        let was_here = *cell == Some(index);
        if was_here {
            *cell = None;
        }
        self.players.remove(&index).is_some() && was_here
    }
}

/// What a successful walk did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved(Position),
    /// Stepped on an exit and now stands on another map.
    Transitioned { map: MapId, pos: Position },
}

pub struct WorldMapSet {
    maps: HashMap<MapId, GameMap>,
    loading: HashSet<MapId>,
    requests: Vec<MapId>,
    loader: Arc<dyn MapLoader>,
    map_count: MapId,
    max_active: usize,
    eviction: bool,
}

impl WorldMapSet {
    /// `max_active` of 0 disables eviction.
    pub fn new(loader: Arc<dyn MapLoader>, map_count: MapId, max_active: usize) -> Self {
        Self {
            maps: HashMap::new(),
            loading: HashSet::new(),
            requests: Vec::new(),
            loader,
            map_count,
            max_active,
            eviction: max_active > 0,
        }
    }

    pub fn loader(&self) -> Arc<dyn MapLoader> {
        Arc::clone(&self.loader)
    }

    pub fn map_count(&self) -> MapId {
        self.map_count
    }

    pub fn set_eviction(&mut self, enabled: bool) {
        self.eviction = enabled && self.max_active > 0;
    }

    pub fn active_count(&self) -> usize {
        self.maps.len()
    }

    pub fn active_maps(&self) -> Vec<MapId> {
        let mut ids: Vec<MapId> = self.maps.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_loaded(&self, map: MapId) -> bool {
        self.maps.contains_key(&map)
    }

    pub fn is_loading(&self, map: MapId) -> bool {
        self.loading.contains(&map)
    }

    pub fn get(&self, map: MapId) -> Option<&GameMap> {
        self.maps.get(&map)
    }

    pub fn check_id(&self, map: MapId) -> Result<(), WorldError> {
        if map == 0 || map > self.map_count {
            Err(WorldError::InvalidMap(map))
        } else {
            Ok(())
        }
    }

    /// Makes sure `map` is loaded or on its way. Fails with `MapNotLoaded`
    /// while it is not ready yet.
    pub fn ensure(&mut self, map: MapId) -> Result<&GameMap, WorldError> {
        self.check_id(map)?;
        if !self.maps.contains_key(&map) {
            self.request(map);
            return Err(WorldError::MapNotLoaded(map));
        }
        self.maps.get(&map).ok_or(WorldError::MapNotLoaded(map))
    }

    /// Queues a load unless the map is already loaded or loading.
    pub fn request(&mut self, map: MapId) {
        if self.maps.contains_key(&map) || !self.loading.insert(map) {
            return;
        }
        debug!("Map {} requested", map);
        self.requests.push(map);
    }

    pub fn take_load_requests(&mut self) -> Vec<MapId> {
        std::mem::take(&mut self.requests)
    }

    /// Loads a map synchronously on the calling thread.
    pub fn load_now(&mut self, map: MapId) -> Result<(), LoadError> {
        if self.maps.contains_key(&map) {
            return Ok(());
        }
        self.loading.insert(map);
        let result = self.loader.load(map);
        self.complete_load(map, result)
    }

    /// Installs the result of a load. On success the active set may be
    /// trimmed, never evicting the map that just arrived.
    pub fn complete_load(
        &mut self,
        map: MapId,
        result: Result<TileGrid, LoadError>,
    ) -> Result<(), LoadError> {
        self.loading.remove(&map);
        match result {
            Ok(grid) => {
                if !self.maps.contains_key(&map) {
                    self.maps.insert(map, GameMap::new(map, grid));
                    info!("Map {} loaded ({} active)", map, self.maps.len());
                }
                self.evict_excess(map);
                Ok(())
            }
            Err(e) => {
                error!("Failed to load map {}: {}", map, e);
                Err(e)
            }
        }
    }

    /// Unloads empty maps, in random order, until the active set fits the
    /// budget again. Returns the evicted ids.
    pub fn evict_excess(&mut self, protect: MapId) -> Vec<MapId> {
        let mut evicted = Vec::new();
        if !self.eviction || self.maps.len() <= self.max_active {
            return evicted;
        }

        let mut candidates: Vec<MapId> = self.maps.keys().copied().filter(|m| *m != protect).collect();
        candidates.shuffle(&mut rand::thread_rng());

        for map in candidates {
            if self.maps.len() <= self.max_active {
                break;
            }
            let empty = self.maps.get(&map).map(GameMap::is_empty).unwrap_or(false);
            if empty {
                self.maps.remove(&map);
                debug!("Map {} evicted", map);
                evicted.push(map);
            }
        }

        if self.maps.len() > self.max_active {
            debug!(
                "{} maps active, over the budget of {} but none can be evicted",
                self.maps.len(),
                self.max_active
            );
        }
        evicted
    }

    /// Puts a player on `map` at the nearest free cell to `target`.
    ///
    /// The joiner's character appears to everyone already there, and the
    /// joiner receives everyone on the map, itself included.
    pub fn player_join(
        &mut self,
        registry: &mut Registry,
        index: CharIndex,
        map: MapId,
        target: Position,
        outbox: &mut Outbox,
    ) -> Result<Position, WorldError> {
        let connection = {
            let player = registry.player(index).ok_or(WorldError::UnknownPlayer(index))?;
            if player.map.is_some() {
                return Err(WorldError::AlreadyOnMap(index));
            }
            player.connection
        };
        self.check_id(map)?;
        let game_map = self.maps.get_mut(&map).ok_or(WorldError::MapNotLoaded(map))?;
        let landing = game_map
            .find_free_near(target)
            .ok_or(WorldError::NoFreeCell { map, pos: target })?;

        let player = registry.player_mut(index).ok_or(WorldError::UnknownPlayer(index))?;
        player.map = Some(map);
        player.pos = landing;
        let appeared = ServerCommand::from(player.character_create());

        let others = game_map.audience(None);
        game_map.place(index, connection, landing);
        outbox.send_all(others, appeared);

        for other in game_map.players() {
            if let Some(existing) = registry.player(other) {
                outbox.send(connection, existing.character_create());
            }
        }
        debug!("Character {} joined map {} at {}", index, map, landing);
        Ok(landing)
    }

    /// Takes a player off its map and tells the remaining occupants.
    pub fn player_leave(
        &mut self,
        registry: &mut Registry,
        index: CharIndex,
        outbox: &mut Outbox,
    ) -> Result<MapId, WorldError> {
        let player = registry.player_mut(index).ok_or(WorldError::UnknownPlayer(index))?;
        let map = player.map.ok_or(WorldError::NotOnMap(index))?;
        let pos = player.pos;

        let game_map = self.maps.get_mut(&map).ok_or_else(|| {
            WorldError::Inconsistent(format!("character {} is on unloaded map {}", index, map))
        })?;
        if !game_map.remove(index, pos) {
            error!("Character {} was not at {} on map {}", index, pos, map);
        }
        player.map = None;
        outbox.send_all(game_map.audience(None), CharacterRemove { char_index: index });
        debug!("Character {} left map {}", index, map);
        Ok(map)
    }

    /// Moves a player one cell towards `heading`.
    ///
    /// Everything is validated before anything changes, so a rejected move
    /// leaves the player, the grid and the outbox untouched. Stepping onto
    /// an exit leaves this map and joins the exit's target map.
    pub fn player_move(
        &mut self,
        registry: &mut Registry,
        index: CharIndex,
        heading: Heading,
        outbox: &mut Outbox,
    ) -> Result<MoveOutcome, WorldError> {
        let player = registry.player(index).ok_or(WorldError::UnknownPlayer(index))?;
        let map = player.map.ok_or(WorldError::NotOnMap(index))?;
        let connection = player.connection;
        let from = player.pos;
        let to = from.step(heading).ok_or(WorldError::OutOfBounds)?;

        let game_map = self.maps.get(&map).ok_or_else(|| {
            WorldError::Inconsistent(format!("character {} is on unloaded map {}", index, map))
        })?;
        if game_map.grid.is_blocked(to) {
            return Err(WorldError::Blocked(to));
        }
        if let Some(by) = game_map.occupant(to) {
            return Err(WorldError::Occupied { pos: to, by });
        }

        if let Some(exit) = game_map.grid.tile(to).exit {
            if self.check_id(exit.map).is_err() {
                warn!("Map {} has an exit at {} to missing map {}", map, to, exit.map);
                return Err(WorldError::BrokenExit { pos: to, map: exit.map });
            }
            let Some(target_map) = self.maps.get(&exit.map) else {
                self.request(exit.map);
                return Err(WorldError::MapNotLoaded(exit.map));
            };
            let landing = target_map.find_free_near(exit.pos).ok_or(WorldError::NoFreeCell {
                map: exit.map,
                pos: exit.pos,
            })?;

            if let Some(player) = registry.player_mut(index) {
                player.heading = heading;
            }
            self.player_leave(registry, index, outbox)?;
            outbox.send(
                connection,
                ChangeMap {
                    map: exit.map,
                    version: 0,
                },
            );
            let pos = self.player_join(registry, index, exit.map, landing, outbox)?;
            return Ok(MoveOutcome::Transitioned { map: exit.map, pos });
        }

        let game_map = self.maps.get_mut(&map).ok_or(WorldError::MapNotLoaded(map))?;
        game_map.occupancy[from.cell_index()] = None;
        game_map.occupancy[to.cell_index()] = Some(index);
        let player = registry.player_mut(index).ok_or(WorldError::UnknownPlayer(index))?;
        player.pos = to;
        player.heading = heading;

        outbox.send_all(
            game_map.audience(Some(index)),
            CharacterMove {
                char_index: index,
                x: to.x,
                y: to.y,
            },
        );
        Ok(MoveOutcome::Moved(to))
    }

    /// Sends `command` to everyone on `map`, optionally leaving one out.
    pub fn broadcast(
        &self,
        map: MapId,
        except: Option<CharIndex>,
        command: impl Into<ServerCommand>,
        outbox: &mut Outbox,
    ) {
        if let Some(game_map) = self.maps.get(&map) {
            outbox.send_all(game_map.audience(except), command);
        }
    }

    /// Checks the occupancy invariant of every active map against the
    /// registry. Returns a description of the first mismatch.
    pub fn verify(&self, registry: &Registry) -> Result<(), String> {
        for (id, game_map) in &self.maps {
            for index in game_map.players() {
                let player = registry
                    .player(index)
                    .ok_or_else(|| format!("map {} lists unknown character {}", id, index))?;
                if player.map != Some(*id) {
                    return Err(format!("character {} listed on map {} but thinks it is on {:?}", index, id, player.map));
                }
                if game_map.occupant(player.pos) != Some(index) {
                    return Err(format!("character {} not at its position {} on map {}", index, player.pos, id));
                }
            }
            for (pos, index) in game_map.occupied_cells() {
                if !game_map.contains(index) {
                    return Err(format!("stray character {} at {} on map {}", index, pos, id));
                }
                let at = registry.player(index).map(|p| p.pos);
                if at != Some(pos) {
                    return Err(format!("character {} occupies {} but stands at {:?}", index, pos, at));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::{MapExit, MemoryMapLoader};
    use crate::player::Player;
    use crate::registry::Limits;

    fn pos(x: u8, y: u8) -> Position {
        Position::new(x, y).unwrap()
    }

    fn registry() -> Registry {
        Registry::new(Limits {
            max_connections: 100,
            max_connections_per_ip: 100,
            max_players: 100,
        })
    }

    fn world_with(loader: MemoryMapLoader, max_active: usize) -> WorldMapSet {
        let mut world = WorldMapSet::new(Arc::new(loader), 5, max_active);
        world.load_now(1).unwrap();
        world
    }

    fn add_player(registry: &mut Registry, name: &str, connection: ConnectionId) -> CharIndex {
        registry
            .register_player(Player::new(name, connection, pos(50, 50)))
            .unwrap()
    }

    #[test]
    fn test_ensure_requests_once() {
        let mut world = WorldMapSet::new(Arc::new(MemoryMapLoader::open_maps(5)), 5, 0);

        assert_eq!(world.ensure(2).unwrap_err(), WorldError::MapNotLoaded(2));
        assert_eq!(world.ensure(2).unwrap_err(), WorldError::MapNotLoaded(2));
        assert!(world.is_loading(2));
        assert_eq!(world.take_load_requests(), vec![2]);
        assert!(world.take_load_requests().is_empty());
        assert_eq!(world.ensure(9).unwrap_err(), WorldError::InvalidMap(9));
        assert_eq!(world.ensure(0).unwrap_err(), WorldError::InvalidMap(0));
    }

    #[test]
    fn test_complete_load_installs_map() {
        let mut world = WorldMapSet::new(Arc::new(MemoryMapLoader::open_maps(5)), 5, 0);
        world.request(3);
        let grid = world.loader().load(3).unwrap();

        world.complete_load(3, Ok(grid)).unwrap();
        assert!(world.is_loaded(3));
        assert!(!world.is_loading(3));
        assert!(world.ensure(3).is_ok());
    }

    #[test]
    fn test_failed_load_leaves_map_unloaded() {
        let mut world = WorldMapSet::new(Arc::new(MemoryMapLoader::open_maps(5).with_failing(4)), 5, 0);
        assert!(world.load_now(4).is_err());
        assert!(!world.is_loaded(4));
        assert!(!world.is_loading(4));
    }

    #[test]
    fn test_join_places_player_and_announces() {
        let mut registry = registry();
        let mut world = world_with(MemoryMapLoader::open_maps(5), 0);
        let mut outbox = Outbox::new();

        let a = add_player(&mut registry, "Ana", 10);
        world.player_join(&mut registry, a, 1, pos(50, 50), &mut outbox).unwrap();
        assert_eq!(outbox.for_connection(10).len(), 1);
        outbox.drain();

        let b = add_player(&mut registry, "Beto", 20);
        let landing = world.player_join(&mut registry, b, 1, pos(50, 50), &mut outbox).unwrap();

        assert_ne!(landing, pos(50, 50));
        assert_eq!(outbox.for_connection(10).len(), 1);
        assert_eq!(outbox.for_connection(20).len(), 2);
        assert!(world.verify(&registry).is_ok());
    }

    #[test]
    fn test_join_twice_is_rejected() {
        let mut registry = registry();
        let mut world = world_with(MemoryMapLoader::open_maps(5), 0);
        let mut outbox = Outbox::new();
        let a = add_player(&mut registry, "Ana", 10);

        world.player_join(&mut registry, a, 1, pos(50, 50), &mut outbox).unwrap();
        assert_eq!(
            world.player_join(&mut registry, a, 1, pos(10, 10), &mut outbox),
            Err(WorldError::AlreadyOnMap(a))
        );
        assert!(world.verify(&registry).is_ok());
    }

    #[test]
    fn test_join_unloaded_map() {
        let mut registry = registry();
        let mut world = world_with(MemoryMapLoader::open_maps(5), 0);
        let a = add_player(&mut registry, "Ana", 10);

        assert_eq!(
            world.player_join(&mut registry, a, 2, pos(50, 50), &mut Outbox::new()),
            Err(WorldError::MapNotLoaded(2))
        );
        assert_eq!(registry.player(a).unwrap().map, None);
    }

    #[test]
    fn test_leave_announces_to_remaining() {
        let mut registry = registry();
        let mut world = world_with(MemoryMapLoader::open_maps(5), 0);
        let mut outbox = Outbox::new();
        let a = add_player(&mut registry, "Ana", 10);
        let b = add_player(&mut registry, "Beto", 20);
        world.player_join(&mut registry, a, 1, pos(50, 50), &mut outbox).unwrap();
        world.player_join(&mut registry, b, 1, pos(60, 60), &mut outbox).unwrap();
        outbox.drain();

        assert_eq!(world.player_leave(&mut registry, a, &mut outbox), Ok(1));
        assert_eq!(
            outbox.for_connection(20),
            vec![&ServerCommand::CharacterRemove(CharacterRemove { char_index: a })]
        );
        assert!(outbox.for_connection(10).is_empty());
        assert_eq!(world.get(1).unwrap().occupant(pos(50, 50)), None);
        assert_eq!(
            world.player_leave(&mut registry, a, &mut outbox),
            Err(WorldError::NotOnMap(a))
        );
        assert!(world.verify(&registry).is_ok());
    }

    #[test]
    fn test_move_updates_grid_and_notifies_others() {
        let mut registry = registry();
        let mut world = world_with(MemoryMapLoader::open_maps(5), 0);
        let mut outbox = Outbox::new();
        let a = add_player(&mut registry, "Ana", 10);
        let b = add_player(&mut registry, "Beto", 20);
        world.player_join(&mut registry, a, 1, pos(50, 50), &mut outbox).unwrap();
        world.player_join(&mut registry, b, 1, pos(10, 10), &mut outbox).unwrap();
        outbox.drain();

        let outcome = world.player_move(&mut registry, a, Heading::North, &mut outbox).unwrap();

        assert_eq!(outcome, MoveOutcome::Moved(pos(50, 49)));
        assert_eq!(registry.player(a).unwrap().heading, Heading::North);
        assert_eq!(world.get(1).unwrap().occupant(pos(50, 49)), Some(a));
        assert_eq!(world.get(1).unwrap().occupant(pos(50, 50)), None);
        assert!(outbox.for_connection(10).is_empty());
        assert_eq!(
            outbox.for_connection(20),
            vec![&ServerCommand::CharacterMove(CharacterMove {
                char_index: a,
                x: 50,
                y: 49
            })]
        );
        assert!(world.verify(&registry).is_ok());
    }

    #[test]
    fn test_move_rejections_change_nothing() {
        let grid = TileGrid::open(Default::default()).with_blocked(pos(51, 50));
        let loader = MemoryMapLoader::open_maps(5).with_map(1, grid);
        let mut registry = registry();
        let mut world = world_with(loader, 0);
        let mut outbox = Outbox::new();
        let a = add_player(&mut registry, "Ana", 10);
        let b = add_player(&mut registry, "Beto", 20);
        world.player_join(&mut registry, a, 1, pos(50, 50), &mut outbox).unwrap();
        world.player_join(&mut registry, b, 1, pos(50, 51), &mut outbox).unwrap();
        outbox.drain();

        let blocked = world.player_move(&mut registry, a, Heading::East, &mut outbox);
        assert_eq!(blocked, Err(WorldError::Blocked(pos(51, 50))));
        let occupied = world.player_move(&mut registry, a, Heading::South, &mut outbox);
        assert_eq!(occupied, Err(WorldError::Occupied { pos: pos(50, 51), by: b }));

        assert!(blocked.unwrap_err().is_game_logic());
        assert_eq!(registry.player(a).unwrap().pos, pos(50, 50));
        assert_eq!(registry.player(a).unwrap().heading, Heading::South);
        assert!(outbox.is_empty());
        assert!(world.verify(&registry).is_ok());
    }

    #[test]
    fn test_move_off_the_edge() {
        let mut registry = registry();
        let mut world = world_with(MemoryMapLoader::open_maps(5), 0);
        let a = add_player(&mut registry, "Ana", 10);
        world.player_join(&mut registry, a, 1, pos(1, 1), &mut Outbox::new()).unwrap();

        assert_eq!(
            world.player_move(&mut registry, a, Heading::West, &mut Outbox::new()),
            Err(WorldError::OutOfBounds)
        );
    }

    #[test]
    fn test_exit_transitions_between_maps() {
        let exit = MapExit { map: 2, pos: pos(10, 10) };
        let grid = TileGrid::open(Default::default()).with_exit(pos(50, 49), exit);
        let loader = MemoryMapLoader::open_maps(5).with_map(1, grid);
        let mut registry = registry();
        let mut world = world_with(loader, 0);
        let mut outbox = Outbox::new();
        let a = add_player(&mut registry, "Ana", 10);
        world.player_join(&mut registry, a, 1, pos(50, 50), &mut outbox).unwrap();

        assert_eq!(
            world.player_move(&mut registry, a, Heading::North, &mut outbox),
            Err(WorldError::MapNotLoaded(2))
        );
        assert_eq!(registry.player(a).unwrap().pos, pos(50, 50));
        assert_eq!(world.take_load_requests(), vec![2]);

        world.load_now(2).unwrap();
        outbox.drain();
        let outcome = world.player_move(&mut registry, a, Heading::North, &mut outbox).unwrap();

        assert_eq!(outcome, MoveOutcome::Transitioned { map: 2, pos: pos(10, 10) });
        assert!(world.get(1).unwrap().is_empty());
        assert!(world.get(2).unwrap().contains(a));
        assert_eq!(registry.player(a).unwrap().map, Some(2));
        assert!(outbox
            .for_connection(10)
            .contains(&&ServerCommand::ChangeMap(ChangeMap { map: 2, version: 0 })));
        assert!(world.verify(&registry).is_ok());
    }

    #[test]
    fn test_eviction_skips_occupied_and_protected_maps() {
        let mut registry = registry();
        let mut world = world_with(MemoryMapLoader::open_maps(5), 2);
        let a = add_player(&mut registry, "Ana", 10);
        world.player_join(&mut registry, a, 1, pos(50, 50), &mut Outbox::new()).unwrap();

        world.load_now(2).unwrap();
        assert_eq!(world.active_maps(), vec![1, 2]);

        world.load_now(3).unwrap();
        assert_eq!(world.active_maps(), vec![1, 3]);

        world.load_now(4).unwrap();
        assert_eq!(world.active_maps(), vec![1, 4]);
    }

    #[test]
    fn test_eviction_over_budget_when_everything_is_busy() {
        let mut registry = registry();
        let mut world = world_with(MemoryMapLoader::open_maps(5), 1);
        let a = add_player(&mut registry, "Ana", 10);
        world.player_join(&mut registry, a, 1, pos(50, 50), &mut Outbox::new()).unwrap();

        world.load_now(2).unwrap();
        assert_eq!(world.active_maps(), vec![1, 2]);
        assert_eq!(world.evict_excess(0), vec![2]);
    }

    #[test]
    fn test_reload_after_eviction_is_identical() {
        let loader = Arc::new(
            MemoryMapLoader::open_maps(5)
                .with_map(2, TileGrid::open(Default::default()).with_blocked(pos(3, 3))),
        );
        let mut world = WorldMapSet::new(loader.clone(), 5, 1);

        world.load_now(2).unwrap();
        let before = world.get(2).unwrap().grid().clone();
        world.load_now(3).unwrap();
        assert!(!world.is_loaded(2));

        world.load_now(2).unwrap();
        assert_eq!(world.get(2).unwrap().grid(), &before);
        assert_eq!(loader.load_count(2), 2);
    }

    #[test]
    fn test_no_eviction_when_disabled() {
        let mut world = WorldMapSet::new(Arc::new(MemoryMapLoader::open_maps(5)), 5, 1);
        world.set_eviction(false);
        for map in 1..=5 {
            world.load_now(map).unwrap();
        }
        assert_eq!(world.active_count(), 5);
    }

    #[test]
    fn test_leave_from_unloaded_map_keeps_player_record() {
        let mut world = world_with(MemoryMapLoader::open_maps(5), 0);
        let mut registry = registry();
        let index = add_player(&mut registry, "Ana", 1);
        registry.player_mut(index).unwrap().map = Some(3);

        let err = world
            .player_leave(&mut registry, index, &mut Outbox::new())
            .unwrap_err();
        assert!(matches!(err, WorldError::Inconsistent(_)));
        assert_eq!(registry.player(index).unwrap().map, Some(3));
    }
}
