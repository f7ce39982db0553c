//! The synchronous server core.
//!
//! `GameServer` owns every piece of mutable state and is driven one event at
//! a time: a connection opened, bytes arrived, a peer went away, a map load
//! finished, a timer fired. The async network shell feeds it these events
//! from a single task, so nothing in here locks or awaits. Tests drive it
//! directly with in-memory transports.

use crate::codec::CommandCodec;
use crate::config::{MapLoading, ServerConfig};
use crate::connection::{Connection, ConnectionId, Transport};
use crate::dispatch::{dispatch, Halt, Session};
use crate::error::{ErrorKind, LoadError, RegistryError, ServerError, WorldError};
use crate::maps::{MapLoader, TileGrid};
use crate::outbox::Outbox;
use crate::player::NameRules;
use crate::registry::{Limits, Registry};
use crate::world::WorldMapSet;
use log::{debug, error, info, warn};
use shared::commands::server::ErrorMsg;
use shared::{CharIndex, MapId, ServerCommand};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

pub struct GameServer {
    config: ServerConfig,
    codec: CommandCodec,
    registry: Registry,
    world: WorldMapSet,
    names: NameRules,
    connections: HashMap<ConnectionId, Connection>,
    outbox: Outbox,
    next_connection: ConnectionId,
    started: Instant,
}

impl GameServer {
    /// Builds the command table and the world. In full loading mode every
    /// map is read here, before any connection is accepted.
    pub fn new(
        config: ServerConfig,
        loader: Arc<dyn MapLoader>,
        names: NameRules,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let codec = CommandCodec::standard()?;
        let registry = Registry::new(Limits {
            max_connections: config.limits.max_connections,
            max_connections_per_ip: config.limits.max_connections_per_ip,
            max_players: config.limits.max_players,
        });
        let mut world = WorldMapSet::new(loader, config.maps.count, config.maps.max_active);

        if config.maps.loading == MapLoading::Full {
            world.set_eviction(false);
            for map in 1..=config.maps.count {
                world.load_now(map)?;
            }
            info!("Preloaded {} maps", world.active_count());
        }

        Ok(Self {
            config,
            codec,
            registry,
            world,
            names,
            connections: HashMap::new(),
            outbox: Outbox::new(),
            next_connection: 1,
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn world(&self) -> &WorldMapSet {
        &self.world
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn loader(&self) -> Arc<dyn MapLoader> {
        self.world.loader()
    }

    /// Maps that were asked for since the last call and must be loaded.
    pub fn take_load_requests(&mut self) -> Vec<MapId> {
        self.world.take_load_requests()
    }

    /// Admits a new peer. A refused peer is sent an `ErrorMsg` and its
    /// transport is closed right away.
    pub fn connection_opened(
        &mut self,
        addr: SocketAddr,
        transport: Transport,
        now: Instant,
    ) -> Result<ConnectionId, RegistryError> {
        let id = self.next_connection;
        self.next_connection += 1;

        let mut connection = Connection::new(id, addr, transport);
        connection.touch(now);
        if let Err(e) = self.registry.register_connection(id, addr) {
            info!("Refused connection from {}: {}", addr, e);
            connection.send(&ServerCommand::from(ErrorMsg {
                message: e.to_string(),
            }));
            connection.close();
            return Err(e);
        }

        info!("Connection {} accepted from {}", id, addr);
        self.connections.insert(id, connection);
        Ok(id)
    }

    /// Appends bytes to the connection's inbound buffer and runs whatever
    /// complete commands it now holds. A parked connection only buffers.
    pub fn data_received(&mut self, id: ConnectionId, data: &[u8], now: Instant) {
        let Some(connection) = self.connections.get_mut(&id) else {
            debug!("Dropping {} bytes for closed connection {}", data.len(), id);
            return;
        };
        connection.inbound.append(data);
        connection.touch(now);
        if connection.parked_on.is_none() {
            self.pump(id);
        }
    }

    /// The peer hung up or the socket failed.
    pub fn connection_closed(&mut self, id: ConnectionId) {
        self.lose_connection(id, "connection closed by peer");
    }

    fn pump(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        if connection.parked_on.is_some() {
            return;
        }

        let mut inbound = std::mem::take(&mut connection.inbound);
        let result = {
            let mut session = Session {
                connection: &mut *connection,
                registry: &mut self.registry,
                world: &mut self.world,
                config: &self.config,
                names: &self.names,
                outbox: &mut self.outbox,
                started: self.started,
            };
            dispatch(&self.codec, &mut inbound, &mut session)
        };
        connection.inbound = inbound;

        let close_reason = match result {
            Ok(report) => match report.halt {
                Halt::Drained => None,
                Halt::Parked(map) => {
                    debug!("Connection {} parked until map {} loads", id, map);
                    connection.parked_on = Some(map);
                    None
                }
                Halt::CloseRequested => Some("quit".to_string()),
            },
            Err(err) => {
                match err.kind() {
                    ErrorKind::Refused => info!("Connection {} refused: {}", id, err),
                    ErrorKind::Internal => error!("Connection {}: {}", id, err),
                    _ => warn!("Connection {} dropped: {}", id, err),
                }
                Some(err.to_string())
            }
        };

        self.route();
        if let Some(reason) = close_reason {
            self.lose_connection(id, &reason);
        }
    }

    /// Moves queued commands into the connection buffers they address and
    /// flushes each of those connections once.
    fn route(&mut self) {
        let mut touched = BTreeSet::new();
        for (to, command) in self.outbox.drain() {
            if let Some(connection) = self.connections.get_mut(&to) {
                connection.send(&command);
                touched.insert(to);
            }
        }
        for id in touched {
            if let Some(connection) = self.connections.get_mut(&id) {
                connection.flush();
            }
        }
    }

    /// Tears a connection down: unregister it, take its player out of the
    /// world and the registry, deliver the resulting notifications, then
    /// release the transport. Calling it again for the same id is a no-op.
    pub fn lose_connection(&mut self, id: ConnectionId, reason: &str) -> bool {
        let Some(mut connection) = self.connections.remove(&id) else {
            return false;
        };
        self.registry.unregister_connection(id);

        if let Some(index) = connection.player.take() {
            self.destroy_player(index);
        }

        self.route();
        connection.close();
        info!("Connection {} from {} closed: {}", id, connection.addr, reason);
        true
    }

    /// Takes a player off its map and frees its name and index. Returns
    /// false if the player is gone or already being torn down.
    fn destroy_player(&mut self, index: CharIndex) -> bool {
        match self.registry.player_mut(index) {
            Some(player) if !player.closing => player.closing = true,
            _ => return false,
        }
        match self.world.player_leave(&mut self.registry, index, &mut self.outbox) {
            Ok(_) | Err(WorldError::NotOnMap(_)) => {}
            Err(e) => error!("Character {} could not leave its map: {}", index, e),
        }
        if let Some(player) = self.registry.unregister_player(index) {
            info!("{} logged out", player.name);
        }
        true
    }

    /// Installs a finished map load and resumes every connection parked on
    /// it, oldest first. A failed load refuses the parked connections.
    pub fn map_loaded(&mut self, map: MapId, result: Result<TileGrid, LoadError>) {
        let mut parked: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.parked_on == Some(map))
            .map(|c| c.id)
            .collect();
        parked.sort_unstable();

        match self.world.complete_load(map, result) {
            Ok(()) => {
                for id in parked {
                    if let Some(connection) = self.connections.get_mut(&id) {
                        connection.parked_on = None;
                    }
                    self.pump(id);
                }
            }
            Err(e) => {
                for id in parked {
                    self.outbox.send(
                        id,
                        ErrorMsg {
                            message: format!("Map {} is not available.", map),
                        },
                    );
                    self.route();
                    self.lose_connection(id, &e.to_string());
                }
            }
        }
    }

    /// Runs every pending map load on the calling thread until nothing is
    /// left to load.
    pub fn load_pending_blocking(&mut self) {
        loop {
            let requests = self.take_load_requests();
            if requests.is_empty() {
                break;
            }
            let loader = self.loader();
            for map in requests {
                let result = loader.load(map);
                self.map_loaded(map, result);
            }
        }
    }

    /// Closes connections that have been silent for longer than their
    /// limit. Returns how many were closed.
    pub fn sweep_timeouts(&mut self, now: Instant) -> usize {
        let timeouts = &self.config.timeouts;
        let mut expired: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.idle_for(now) > timeouts.limit(c.is_authenticated()))
            .map(|c| c.id)
            .collect();
        expired.sort_unstable();

        for id in &expired {
            self.lose_connection(*id, "timed out");
        }
        expired.len()
    }

    pub fn log_stats(&self) {
        info!(
            "{} players online, {} connections, {} active maps, up {}s",
            self.registry.player_count(),
            self.connections.len(),
            self.world.active_count(),
            self.started.elapsed().as_secs()
        );
    }

    /// Checks the occupancy invariant across the whole world.
    pub fn verify(&self) -> Result<(), String> {
        self.world.verify(&self.registry)
    }

    /// Closes every connection.
    pub fn shutdown(&mut self) {
        let mut ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            self.lose_connection(id, "server shutting down");
        }
    }
}
