//! World and registry properties exercised across modules

use server::error::{RegistryError, WorldError};
use server::maps::{MapExit, MapLoader, MemoryMapLoader, TileGrid};
use server::outbox::Outbox;
use server::player::Player;
use server::registry::{Limits, Registry};
use server::world::{MoveOutcome, WorldMapSet};
use shared::commands::server::{CharacterMove, ServerCommand};
use shared::{CharIndex, Heading, MapId, Position};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

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

fn world(loader: MemoryMapLoader, maps: MapId, max_active: usize) -> WorldMapSet {
    WorldMapSet::new(Arc::new(loader), maps, max_active)
}

/// Registers a player and puts it on `map` at (or near) `at`.
fn spawn(
    world: &mut WorldMapSet,
    registry: &mut Registry,
    name: &str,
    connection: u64,
    map: MapId,
    at: Position,
) -> CharIndex {
    let index = registry.register_player(Player::new(name, connection, at)).unwrap();
    world
        .player_join(registry, index, map, at, &mut Outbox::new())
        .unwrap();
    index
}

/// INDEX RECYCLING TESTS
mod index_tests {
    use super::*;

    /// Indices stay unique through joins and leaves, and the lowest freed
    /// index is handed out before any untouched one
    #[test]
    fn freed_indices_are_reused_lowest_first() {
        let mut registry = registry();
        let mut live: Vec<CharIndex> = Vec::new();
        let mut names = 0;
        // Deterministic mix of joins and leaves
        let script = [1, 1, 1, 1, 0, 1, 0, 0, 1, 1, 1, 0, 1, 0, 1, 1, 0, 0, 0, 1, 1];

        for (step, join) in script.iter().enumerate() {
            if *join == 1 || live.is_empty() {
                names += 1;
                let lowest_free = (1..)
                    .find(|i| !live.contains(i))
                    .unwrap_or(CharIndex::MAX);
                let index = registry
                    .register_player(Player::new(format!("Player{}", names), names, pos(1, 1)))
                    .unwrap();
                assert_eq!(index, lowest_free, "step {}", step);
                live.push(index);
            } else {
                let victim = live.remove(step % live.len());
                assert!(registry.unregister_player(victim).is_some());
            }

            let unique: HashSet<CharIndex> = live.iter().copied().collect();
            assert_eq!(unique.len(), live.len());
            assert_eq!(registry.player_count(), live.len());
            assert!(!live.contains(&0));
        }
    }
}

/// OCCUPANCY TESTS
mod occupancy_tests {
    use super::*;

    /// The grid and the player set agree after every join, move and leave
    #[test]
    fn occupancy_stays_consistent() {
        let mut world = world(MemoryMapLoader::open_maps(1), 1, 0);
        world.load_now(1).unwrap();
        let mut registry = registry();
        let mut outbox = Outbox::new();

        let a = spawn(&mut world, &mut registry, "Ana", 1, 1, pos(50, 50));
        let b = spawn(&mut world, &mut registry, "Beto", 2, 1, pos(50, 50));
        let c = spawn(&mut world, &mut registry, "Caro", 3, 1, pos(50, 50));
        world.verify(&registry).unwrap();

        let moves = [
            (a, Heading::North),
            (b, Heading::West),
            (c, Heading::South),
            (a, Heading::North),
            (b, Heading::West),
            (a, Heading::East),
        ];
        for (index, heading) in moves {
            let _ = world.player_move(&mut registry, index, heading, &mut outbox);
            world.verify(&registry).unwrap();
        }

        world.player_leave(&mut registry, b, &mut outbox).unwrap();
        registry.unregister_player(b);
        world.verify(&registry).unwrap();
        assert_eq!(world.get(1).unwrap().player_count(), 2);
    }

    /// Joins onto an occupied cell land on the nearest free one
    #[test]
    fn crowded_start_spreads_players_out() {
        let mut world = world(MemoryMapLoader::open_maps(1), 1, 0);
        world.load_now(1).unwrap();
        let mut registry = registry();

        let indices: Vec<CharIndex> = (0..9)
            .map(|i| spawn(&mut world, &mut registry, &format!("P{}", i), i, 1, pos(50, 50)))
            .collect();

        let cells: HashSet<Position> = indices
            .iter()
            .map(|i| registry.player(*i).unwrap().pos)
            .collect();
        assert_eq!(cells.len(), 9);
        for cell in &cells {
            assert!((49..=51).contains(&cell.x) && (49..=51).contains(&cell.y));
        }
        world.verify(&registry).unwrap();
    }
}

/// MOVEMENT TESTS
mod movement_tests {
    use super::*;

    /// A at (50,50) facing south walks north: it ends at (50,49) facing
    /// north and everyone else on the map hears about it
    #[test]
    fn walk_north_is_broadcast_to_others() {
        let mut world = world(MemoryMapLoader::open_maps(1), 1, 0);
        world.load_now(1).unwrap();
        let mut registry = registry();
        let a = spawn(&mut world, &mut registry, "Ana", 1, 1, pos(50, 50));
        spawn(&mut world, &mut registry, "Beto", 2, 1, pos(10, 10));
        spawn(&mut world, &mut registry, "Caro", 3, 1, pos(90, 90));
        assert_eq!(registry.player(a).unwrap().heading, Heading::South);

        let mut outbox = Outbox::new();
        let outcome = world
            .player_move(&mut registry, a, Heading::North, &mut outbox)
            .unwrap();

        assert_eq!(outcome, MoveOutcome::Moved(pos(50, 49)));
        let player = registry.player(a).unwrap();
        assert_eq!(player.pos, pos(50, 49));
        assert_eq!(player.heading, Heading::North);

        let expected = ServerCommand::from(CharacterMove {
            char_index: a,
            x: 50,
            y: 49,
        });
        assert_eq!(outbox.for_connection(2), vec![&expected]);
        assert_eq!(outbox.for_connection(3), vec![&expected]);
        assert!(outbox.for_connection(1).is_empty());
    }

    /// Blocked and occupied targets leave everything as it was
    #[test]
    fn rejected_moves_change_nothing() {
        let grid = TileGrid::open(Default::default()).with_blocked(pos(50, 49));
        let loader = MemoryMapLoader::new().with_map(1, grid);
        let mut world = world(loader, 1, 0);
        world.load_now(1).unwrap();
        let mut registry = registry();
        let a = spawn(&mut world, &mut registry, "Ana", 1, 1, pos(50, 50));
        let b = spawn(&mut world, &mut registry, "Beto", 2, 1, pos(51, 50));
        let mut outbox = Outbox::new();

        let blocked = world
            .player_move(&mut registry, a, Heading::North, &mut outbox)
            .unwrap_err();
        assert_eq!(blocked, WorldError::Blocked(pos(50, 49)));
        assert!(blocked.is_game_logic());

        let occupied = world
            .player_move(&mut registry, a, Heading::East, &mut outbox)
            .unwrap_err();
        assert_eq!(
            occupied,
            WorldError::Occupied {
                pos: pos(51, 50),
                by: b
            }
        );
        assert!(occupied.is_game_logic());

        let player = registry.player(a).unwrap();
        assert_eq!(player.pos, pos(50, 50));
        assert_eq!(player.heading, Heading::South);
        assert_eq!(world.get(1).unwrap().occupant(pos(50, 50)), Some(a));
        assert!(outbox.is_empty());
        world.verify(&registry).unwrap();
    }

    /// Stepping on an exit moves the player to the linked map
    #[test]
    fn exit_tile_changes_map() {
        let exit = MapExit {
            map: 2,
            pos: pos(20, 20),
        };
        let grid = TileGrid::open(Default::default()).with_exit(pos(50, 49), exit);
        let loader = MemoryMapLoader::open_maps(2).with_map(1, grid);
        let mut world = world(loader, 2, 0);
        world.load_now(1).unwrap();
        let mut registry = registry();
        let a = spawn(&mut world, &mut registry, "Ana", 1, 1, pos(50, 50));
        let mut outbox = Outbox::new();

        let err = world
            .player_move(&mut registry, a, Heading::North, &mut outbox)
            .unwrap_err();
        assert_eq!(err, WorldError::MapNotLoaded(2));
        assert_eq!(world.take_load_requests(), vec![2]);
        assert_eq!(registry.player(a).unwrap().map, Some(1));

        world.load_now(2).unwrap();
        let outcome = world
            .player_move(&mut registry, a, Heading::North, &mut outbox)
            .unwrap();
        assert_eq!(
            outcome,
            MoveOutcome::Transitioned {
                map: 2,
                pos: pos(20, 20)
            }
        );
        assert!(world.get(1).unwrap().is_empty());
        assert_eq!(world.get(2).unwrap().occupant(pos(20, 20)), Some(a));
        world.verify(&registry).unwrap();
    }

    /// An exit pointing past the last map is refused like a wall and the
    /// player stays where it was
    #[test]
    fn exit_to_missing_map_is_rejected() {
        let exit = MapExit {
            map: 7,
            pos: pos(20, 20),
        };
        let grid = TileGrid::open(Default::default()).with_exit(pos(50, 49), exit);
        let loader = MemoryMapLoader::open_maps(2).with_map(1, grid);
        let mut world = world(loader, 2, 0);
        world.load_now(1).unwrap();
        let mut registry = registry();
        let a = spawn(&mut world, &mut registry, "Ana", 1, 1, pos(50, 50));
        let mut outbox = Outbox::new();

        let err = world
            .player_move(&mut registry, a, Heading::North, &mut outbox)
            .unwrap_err();
        assert_eq!(
            err,
            WorldError::BrokenExit {
                pos: pos(50, 49),
                map: 7
            }
        );
        assert!(err.is_game_logic());
        assert!(world.take_load_requests().is_empty());

        let player = registry.player(a).unwrap();
        assert_eq!(player.map, Some(1));
        assert_eq!(player.pos, pos(50, 50));
        assert_eq!(world.get(1).unwrap().occupant(pos(50, 50)), Some(a));
        assert!(outbox.is_empty());
        world.verify(&registry).unwrap();
    }
}

/// CAPACITY TESTS
mod capacity_tests {
    use super::*;

    fn addr(ip: [u8; 4], port: u16) -> SocketAddr {
        SocketAddr::from((ip, port))
    }

    /// A third connection is refused under a global cap of two
    #[test]
    fn global_connection_cap() {
        let mut registry = Registry::new(Limits {
            max_connections: 2,
            max_connections_per_ip: 10,
            max_players: 10,
        });
        registry.register_connection(1, addr([10, 0, 0, 1], 1)).unwrap();
        registry.register_connection(2, addr([10, 0, 0, 2], 1)).unwrap();

        assert_eq!(
            registry.register_connection(3, addr([10, 0, 0, 3], 1)),
            Err(RegistryError::TooManyConnections(2))
        );
        assert!(registry.has_connection(1));
        assert!(registry.has_connection(2));
        assert_eq!(registry.connection_count(), 2);
    }

    /// A second connection from the same address is refused under a
    /// per-address cap of one
    #[test]
    fn per_address_cap() {
        let mut registry = Registry::new(Limits {
            max_connections: 10,
            max_connections_per_ip: 1,
            max_players: 10,
        });
        registry.register_connection(1, addr([10, 0, 0, 1], 1)).unwrap();

        assert_eq!(
            registry.register_connection(2, addr([10, 0, 0, 1], 2)),
            Err(RegistryError::TooManyFromAddress(1))
        );
        registry.register_connection(3, addr([10, 0, 0, 2], 1)).unwrap();
        assert_eq!(registry.connection_count(), 2);
    }
}

/// MAP LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// An evicted map reloads from the loader with identical contents
    #[test]
    fn eviction_then_identical_reload() {
        let grid = TileGrid::open(Default::default())
            .with_blocked(pos(5, 5))
            .with_blocked(pos(6, 5));
        let loader = Arc::new(MemoryMapLoader::open_maps(2).with_map(1, grid.clone()));
        let mut world = WorldMapSet::new(loader.clone(), 2, 1);

        world.load_now(1).unwrap();
        world.load_now(2).unwrap();
        assert_eq!(world.active_maps(), vec![2]);

        world.load_now(1).unwrap();
        assert_eq!(world.active_maps(), vec![1]);
        assert_eq!(loader.load_count(1), 2);
        assert_eq!(world.get(1).unwrap().grid(), &grid);
        assert_eq!(loader.load(1).unwrap(), grid);
    }
}
