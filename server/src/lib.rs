//! # Tile World Server Library
//!
//! The authoritative server for a tile-based multiplayer world. Peers speak
//! a binary TCP protocol of one-byte opcodes followed by little-endian
//! fields; the server decodes each command, applies it to the world and
//! answers with server commands addressed to one or many peers.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! All game state lives in one [`server::GameServer`] value that is mutated
//! only from the network event loop. Socket reads, socket closes, timer
//! ticks and finished map loads all arrive there as events, so commands from
//! different peers never interleave.
//!
//! ### Transactional Framing
//! Every connection keeps an inbound [`shared::FrameBuffer`]. The dispatch
//! loop marks the read cursor before each command and either commits it
//! once the handler returns or rolls it back when the command has not fully
//! arrived, so a command split across reads runs exactly once.
//!
//! ### Lazy Maps
//! Maps are read from disk the first time someone needs them. The load runs
//! on the blocking pool; connections that asked for it are parked with
//! their bytes still buffered and resume when the map arrives.
//!
//! ## Module Organization
//!
//! - `codec`: the opcode table and per-command authentication rule
//! - `dispatch`: the per-buffer command loop
//! - `handlers`: one function per client command
//! - `connection`: per-peer buffers and transport handle
//! - `registry`: connection and player bookkeeping, capacity limits
//! - `player`: player state and name rules
//! - `world`: active maps, occupancy and movement
//! - `maps`: tile data and the loaders that produce it
//! - `server`: the synchronous core driven by events
//! - `network`: TCP sockets, timers and background map loads
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::maps::MapFileLoader;
//! use server::network::NetworkServer;
//! use server::player::NameRules;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let loader = Arc::new(MapFileLoader::new(config.maps.path.clone()));
//!     let server = NetworkServer::bind(config, loader, NameRules::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod maps;
pub mod network;
pub mod outbox;
pub mod player;
pub mod registry;
pub mod server;
pub mod world;
