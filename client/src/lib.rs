//! # Headless Client Library
//!
//! A scripted bot for the tile world server. It logs in, follows a route
//! one step at a time, chats, and logs every server command it decodes.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The client's view of the world, rebuilt from server commands:
//! - Own character index and current map
//! - Every character on the map and where it stands
//! - A predicted position for our own walks, corrected by `PosUpdate`
//!
//! ### Input Module (`input`)
//! Route parsing (`"NNEESW"`) and the queue of scripted commands.
//!
//! ### Network Module (`network`)
//! TCP connection, incremental decoding of server commands and the run loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::{parse_route, InputManager};
//! use client::network::Client;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let route = parse_route("NNE")?;
//! let input = InputManager::scripted(&route, Some("hola"));
//! let mut client = Client::connect("127.0.0.1:7666", input, Duration::from_millis(250)).await?;
//! client.login("Ana", "secret").await?;
//! client.run(Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod game;
pub mod input;
pub mod network;
