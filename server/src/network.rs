//! Server network layer: TCP accept loop, per-connection socket tasks and
//! the event loop that drives [`GameServer`].
//!
//! Socket tasks never touch game state. Readers forward raw bytes as
//! [`ServerEvent`]s over one unbounded channel; writers drain the
//! connection's outgoing channel. The event loop is the only place the
//! game server is mutated, so commands from different peers never
//! interleave.

use crate::config::ServerConfig;
use crate::connection::{ConnectionId, Transport, TransportHandle};
use crate::error::{LoadError, ServerError};
use crate::maps::{MapLoader, TileGrid};
use crate::player::NameRules;
use crate::server::GameServer;
use bytes::Bytes;
use log::{debug, error, info, trace};
use shared::MapId;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

const READ_CHUNK: usize = 4096;
const TIMEOUT_SWEEP: Duration = Duration::from_secs(10);
const STATS_PERIOD: Duration = Duration::from_secs(60);

/// Messages sent from socket and loader tasks to the event loop
#[derive(Debug)]
pub enum ServerEvent {
    Data {
        id: ConnectionId,
        bytes: Bytes,
    },
    Closed {
        id: ConnectionId,
    },
    MapLoaded {
        map: MapId,
        result: Result<TileGrid, LoadError>,
    },
}

/// Listening socket plus the game server it feeds
pub struct NetworkServer {
    listener: TcpListener,
    game: GameServer,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl NetworkServer {
    pub async fn bind(
        config: ServerConfig,
        loader: Arc<dyn MapLoader>,
        names: NameRules,
    ) -> Result<Self, ServerError> {
        let address = config.listen_address();
        let game = GameServer::new(config, loader, names)?;
        let listener = TcpListener::bind(&address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            listener,
            game,
            events_tx,
            events_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs until Ctrl+C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Main loop. Every branch runs to completion before the next event is
    /// looked at.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let NetworkServer {
            listener,
            mut game,
            events_tx,
            mut events_rx,
        } = self;

        let mut sweep = interval(TIMEOUT_SWEEP);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats = interval(STATS_PERIOD);
        stats.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        // Both intervals fire immediately on the first tick
        sweep.tick().await;
        stats.tick().await;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => accept(&mut game, &events_tx, stream, addr),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                Some(event) = events_rx.recv() => handle_event(&mut game, event),
                _ = sweep.tick() => {
                    let closed = game.sweep_timeouts(Instant::now());
                    if closed > 0 {
                        info!("Closed {} idle connections", closed);
                    }
                }
                _ = stats.tick() => game.log_stats(),
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break;
                }
            }
            start_loads(&mut game, &events_tx);
        }

        game.shutdown();
        Ok(())
    }
}

fn accept(
    game: &mut GameServer,
    events: &mpsc::UnboundedSender<ServerEvent>,
    stream: TcpStream,
    addr: SocketAddr,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
    }
    let (transport, handle) = Transport::pair();
    let TransportHandle { outgoing, closed } = handle;
    let (reader, writer) = stream.into_split();

    spawn_writer(writer, outgoing);
    match game.connection_opened(addr, transport, Instant::now()) {
        Ok(id) => spawn_reader(id, reader, closed, events.clone()),
        Err(_) => drop(reader),
    }
}

/// Spawns task that writes queued bytes until the transport is dropped
fn spawn_writer(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
) {
    tokio::spawn(async move {
        while let Some(bytes) = outgoing.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                debug!("Write failed: {}", e);
                break;
            }
        }
        let _ = writer.shutdown().await;
    });
}

/// Spawns task that forwards socket reads until the peer or the server
/// closes the connection
fn spawn_reader(
    id: ConnectionId,
    mut reader: tokio::net::tcp::OwnedReadHalf,
    mut closed: tokio::sync::oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    tokio::spawn(async move {
        let mut buffer = vec![0u8; READ_CHUNK];
        loop {
            tokio::select! {
                _ = &mut closed => break,
                read = reader.read(&mut buffer) => match read {
                    Ok(0) => {
                        let _ = events.send(ServerEvent::Closed { id });
                        break;
                    }
                    Ok(len) => {
                        trace!("Connection {}: read {} bytes", id, len);
                        let bytes = Bytes::copy_from_slice(&buffer[..len]);
                        if events.send(ServerEvent::Data { id, bytes }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Connection {}: read failed: {}", id, e);
                        let _ = events.send(ServerEvent::Closed { id });
                        break;
                    }
                },
            }
        }
    });
}

fn handle_event(game: &mut GameServer, event: ServerEvent) {
    match event {
        ServerEvent::Data { id, bytes } => game.data_received(id, &bytes, Instant::now()),
        ServerEvent::Closed { id } => game.connection_closed(id),
        ServerEvent::MapLoaded { map, result } => game.map_loaded(map, result),
    }
}

/// Runs requested map loads on the blocking pool and posts the results
/// back as events.
fn start_loads(game: &mut GameServer, events: &mpsc::UnboundedSender<ServerEvent>) {
    for map in game.take_load_requests() {
        let loader = game.loader();
        let events = events.clone();
        debug!("Loading map {} in the background", map);
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || loader.load(map)).await {
                Ok(result) => result,
                Err(e) => Err(LoadError::Worker(e.to_string())),
            };
            let _ = events.send(ServerEvent::MapLoaded { map, result });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Transport;
    use crate::maps::MemoryMapLoader;
    use shared::commands::client::LoginExistingChar;
    use shared::ClientCommand;

    fn local_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = 0;
        config.maps.count = 1;
        config
    }

    #[test]
    fn test_run_until_returns_on_shutdown() {
        tokio_test::block_on(async {
            let loader = Arc::new(MemoryMapLoader::open_maps(1));
            let server = NetworkServer::bind(local_config(), loader, NameRules::default())
                .await
                .unwrap();
            assert_ne!(server.local_addr().unwrap().port(), 0);
            tokio_test::assert_ok!(server.run_until(async {}).await);
        });
    }

    #[test]
    fn test_requested_maps_load_in_background() {
        tokio_test::block_on(async {
            let loader = Arc::new(MemoryMapLoader::open_maps(1));
            let mut game = GameServer::new(local_config(), loader, NameRules::default()).unwrap();
            let (transport, _handle) = Transport::pair();
            let id = game
                .connection_opened("127.0.0.1:5000".parse().unwrap(), transport, Instant::now())
                .unwrap();
            let login = ClientCommand::from(LoginExistingChar {
                name: "Ana".to_string(),
                password: "secret".to_string(),
                version_major: 0,
                version_minor: 13,
                version_patch: 0,
            });
            game.data_received(id, &login.to_bytes(), Instant::now());

            let (events_tx, mut events_rx) = mpsc::unbounded_channel();
            start_loads(&mut game, &events_tx);
            let event = events_rx.recv().await.unwrap();
            assert!(matches!(event, ServerEvent::MapLoaded { map: 1, result: Ok(_) }));

            handle_event(&mut game, event);
            assert_eq!(game.registry().player_count(), 1);
        });
    }
}
