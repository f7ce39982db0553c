//! Process-wide bookkeeping of live connections and logged-in players.
//!
//! The registry enforces three limits: total connections, connections per
//! source address, and total players. It also owns character index
//! allocation:
//! - Players live in a dense table indexed by their character index.
//! - Index 0 is reserved; clients read it as "no character".
//! - Freed indices go to a min-heap and the lowest one is reused before the
//!   table grows.
//!
//! Every enumeration returns an owned snapshot so callers can tear down
//! connections while iterating.

use crate::connection::ConnectionId;
use crate::error::RegistryError;
use crate::player::Player;
use log::{debug, info};
use shared::CharIndex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_connections: usize,
    pub max_connections_per_ip: usize,
    pub max_players: usize,
}

pub struct Registry {
    limits: Limits,
    connections: HashMap<ConnectionId, IpAddr>,
    per_address: HashMap<IpAddr, usize>,
    names: HashMap<String, CharIndex>,
    /// Slot 0 is never filled.
    players: Vec<Option<Player>>,
    free: BinaryHeap<Reverse<CharIndex>>,
}

impl Registry {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            connections: HashMap::new(),
            per_address: HashMap::new(),
            names: HashMap::new(),
            players: vec![None],
            free: BinaryHeap::new(),
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Admits a new connection if neither the global nor the per-address
    /// limit is reached.
    pub fn register_connection(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
    ) -> Result<(), RegistryError> {
        if self.connections.len() >= self.limits.max_connections {
            return Err(RegistryError::TooManyConnections(self.limits.max_connections));
        }
        let ip = addr.ip();
        let from_address = self.per_address.get(&ip).copied().unwrap_or(0);
        if from_address >= self.limits.max_connections_per_ip {
            return Err(RegistryError::TooManyFromAddress(
                self.limits.max_connections_per_ip,
            ));
        }

        self.connections.insert(id, ip);
        *self.per_address.entry(ip).or_insert(0) += 1;
        debug!("Registered connection {} from {}", id, addr);
        Ok(())
    }

    /// Removes a connection. Unknown ids are ignored.
    pub fn unregister_connection(&mut self, id: ConnectionId) -> bool {
        let Some(ip) = self.connections.remove(&id) else {
            return false;
        };
        if let Some(count) = self.per_address.get_mut(&ip) {
            *count -= 1;
            if *count == 0 {
                self.per_address.remove(&ip);
            }
        }
        true
    }

    /// Assigns the player a character index and makes its name visible.
    pub fn register_player(&mut self, mut player: Player) -> Result<CharIndex, RegistryError> {
        if self.names.len() >= self.limits.max_players {
            return Err(RegistryError::TooManyPlayers(self.limits.max_players));
        }
        let key = player.name.to_lowercase();
        if self.names.contains_key(&key) {
            return Err(RegistryError::NameTaken(player.name));
        }

        let index = self.allocate_index()?;
        player.char_index = index;
        info!("Player {} logged in as character {}", player.name, index);
        self.names.insert(key, index);
        self.players[usize::from(index)] = Some(player);
        Ok(index)
    }

    /// Removes a player and frees its character index.
    pub fn unregister_player(&mut self, index: CharIndex) -> Option<Player> {
        let player = self.players.get_mut(usize::from(index))?.take()?;
        self.names.remove(&player.name.to_lowercase());
        self.free.push(Reverse(index));
        info!("Player {} left, character {} freed", player.name, index);
        Some(player)
    }

    fn allocate_index(&mut self) -> Result<CharIndex, RegistryError> {
        if let Some(Reverse(index)) = self.free.pop() {
            return Ok(index);
        }
        let next = self.players.len();
        let index = CharIndex::try_from(next).map_err(|_| RegistryError::IndicesExhausted)?;
        self.players.push(None);
        Ok(index)
    }

    pub fn player(&self, index: CharIndex) -> Option<&Player> {
        self.players.get(usize::from(index))?.as_ref()
    }

    pub fn player_mut(&mut self, index: CharIndex) -> Option<&mut Player> {
        self.players.get_mut(usize::from(index))?.as_mut()
    }

    /// Case-insensitive lookup of an online player.
    pub fn player_by_name(&self, name: &str) -> Option<CharIndex> {
        self.names.get(&name.to_lowercase()).copied()
    }

    pub fn player_count(&self) -> usize {
        self.names.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connections_from(&self, ip: IpAddr) -> usize {
        self.per_address.get(&ip).copied().unwrap_or(0)
    }

    pub fn has_connection(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn player_indices(&self) -> Vec<CharIndex> {
        let mut indices: Vec<CharIndex> = self.names.values().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn player_names(&self) -> Vec<String> {
        self.player_indices()
            .into_iter()
            .filter_map(|index| self.player(index).map(|p| p.name.clone()))
            .collect()
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Position;

    fn limits(max_connections: usize, per_ip: usize, max_players: usize) -> Limits {
        Limits {
            max_connections,
            max_connections_per_ip: per_ip,
            max_players,
        }
    }

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "10.0.0.2:8081".parse().unwrap()
    }

    fn player(name: &str) -> Player {
        Player::new(name, 1, Position::new(50, 50).unwrap())
    }

    #[test]
    fn test_registry_creation() {
        let registry = Registry::new(limits(5, 2, 5));
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.player_count(), 0);
        assert!(registry.player_indices().is_empty());
    }

    #[test]
    fn test_connection_cap() {
        let mut registry = Registry::new(limits(2, 10, 10));

        assert!(registry.register_connection(1, test_addr()).is_ok());
        assert!(registry.register_connection(2, test_addr2()).is_ok());
        assert_eq!(
            registry.register_connection(3, test_addr()),
            Err(RegistryError::TooManyConnections(2))
        );
        assert_eq!(registry.connection_ids(), vec![1, 2]);
    }

    #[test]
    fn test_per_address_cap() {
        let mut registry = Registry::new(limits(10, 1, 10));

        assert!(registry.register_connection(1, test_addr()).is_ok());
        let same_host: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(
            registry.register_connection(2, same_host),
            Err(RegistryError::TooManyFromAddress(1))
        );
        assert!(registry.register_connection(3, test_addr2()).is_ok());
        assert_eq!(registry.connection_count(), 2);
    }

    #[test]
    fn test_unregister_connection_is_idempotent() {
        let mut registry = Registry::new(limits(10, 2, 10));
        registry.register_connection(1, test_addr()).unwrap();
        registry.register_connection(2, test_addr()).unwrap();
        assert_eq!(registry.connections_from(test_addr().ip()), 2);

        assert!(registry.unregister_connection(1));
        assert!(!registry.unregister_connection(1));
        assert_eq!(registry.connections_from(test_addr().ip()), 1);

        assert!(registry.unregister_connection(2));
        assert_eq!(registry.connections_from(test_addr().ip()), 0);
        assert!(registry.per_address.is_empty());
    }

    #[test]
    fn test_register_player_assigns_indices_from_one() {
        let mut registry = Registry::new(limits(10, 10, 10));

        assert_eq!(registry.register_player(player("Ana")).unwrap(), 1);
        assert_eq!(registry.register_player(player("Beto")).unwrap(), 2);
        assert_eq!(registry.player(2).unwrap().char_index, 2);
        assert!(registry.player(0).is_none());
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let mut registry = Registry::new(limits(10, 10, 10));
        registry.register_player(player("Ana")).unwrap();

        assert_eq!(
            registry.register_player(player("ANA")),
            Err(RegistryError::NameTaken("ANA".to_string()))
        );
        assert_eq!(registry.player_by_name("aNa"), Some(1));
        assert_eq!(registry.player_count(), 1);
    }

    #[test]
    fn test_player_cap() {
        let mut registry = Registry::new(limits(10, 10, 1));
        registry.register_player(player("Ana")).unwrap();

        assert_eq!(
            registry.register_player(player("Beto")),
            Err(RegistryError::TooManyPlayers(1))
        );
    }

    #[test]
    fn test_lowest_freed_index_is_reused_first() {
        let mut registry = Registry::new(limits(10, 10, 10));
        for name in ["Ana", "Beto", "Carla", "Dario"] {
            registry.register_player(player(name)).unwrap();
        }

        registry.unregister_player(3).unwrap();
        registry.unregister_player(2).unwrap();

        assert_eq!(registry.register_player(player("Eva")).unwrap(), 2);
        assert_eq!(registry.register_player(player("Fede")).unwrap(), 3);
        assert_eq!(registry.register_player(player("Gala")).unwrap(), 5);
        assert_eq!(registry.player_indices(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_unregister_unknown_player() {
        let mut registry = Registry::new(limits(10, 10, 10));
        assert!(registry.unregister_player(9).is_none());
        assert!(registry.unregister_player(0).is_none());
    }

    #[test]
    fn test_unregister_frees_name() {
        let mut registry = Registry::new(limits(10, 10, 10));
        let index = registry.register_player(player("Ana")).unwrap();
        registry.unregister_player(index).unwrap();

        assert_eq!(registry.player_by_name("Ana"), None);
        assert!(registry.register_player(player("Ana")).is_ok());
    }

    #[test]
    fn test_snapshots_are_sorted() {
        let mut registry = Registry::new(limits(10, 10, 10));
        registry.register_player(player("Beto")).unwrap();
        registry.register_player(player("Ana")).unwrap();

        assert_eq!(registry.player_names(), vec!["Beto", "Ana"]);
    }
}
