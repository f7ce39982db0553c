//! Error types for every layer of the server.
//!
//! Handlers return [`CommandError`]. The dispatch loop never matches on the
//! individual variants; it asks for [`CommandError::kind`] and switches on
//! the closed [`ErrorKind`] set, so adding a new variant only requires
//! deciding which kind it belongs to.

use shared::{BufferError, CharIndex, ClientOpcode, MapId, Position};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// How the dispatch loop reacts to a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The command has not fully arrived. Roll back and wait.
    Incomplete,
    /// The bytes can never decode. Fatal.
    Malformed,
    /// Unknown opcode or wrong authentication state. Fatal.
    Violation,
    /// A game rule rejected the action. Consume the command and go on.
    GameLogic,
    /// Login refused; an explanation was already queued. Fatal.
    Refused,
    /// The command needs a map that is still loading. Roll back and park.
    Deferred,
    /// A server invariant broke. Fatal to this connection.
    Internal,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::Malformed | ErrorKind::Violation | ErrorKind::Refused | ErrorKind::Internal
        )
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("{0} requires a logged in connection")]
    NotAuthenticated(ClientOpcode),

    #[error("{0} is only valid before login")]
    AlreadyAuthenticated(ClientOpcode),

    #[error("{0} is not supported by this server")]
    Unsupported(ClientOpcode),

    #[error("{0}")]
    GameLogic(String),

    #[error("refused: {0}")]
    Refused(String),

    #[error("waiting for map {0} to load")]
    Deferred(MapId),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Buffer(BufferError::InsufficientData { .. }) => ErrorKind::Incomplete,
            CommandError::Buffer(BufferError::Malformed(_)) => ErrorKind::Malformed,
            CommandError::UnknownOpcode(_)
            | CommandError::NotAuthenticated(_)
            | CommandError::AlreadyAuthenticated(_)
            | CommandError::Unsupported(_) => ErrorKind::Violation,
            CommandError::GameLogic(_) => ErrorKind::GameLogic,
            CommandError::Refused(_) => ErrorKind::Refused,
            CommandError::Deferred(_) => ErrorKind::Deferred,
            CommandError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn deferred_map(&self) -> Option<MapId> {
        match self {
            CommandError::Deferred(map) => Some(*map),
            _ => None,
        }
    }
}

impl From<WorldError> for CommandError {
    fn from(err: WorldError) -> Self {
        match err {
            WorldError::MapNotLoaded(map) => CommandError::Deferred(map),
            err if err.is_game_logic() => CommandError::GameLogic(err.to_string()),
            err => CommandError::Internal(err.to_string()),
        }
    }
}

impl From<RegistryError> for CommandError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownPlayer(_) => CommandError::Internal(err.to_string()),
            err => CommandError::Refused(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("server is full ({0} connections)")]
    TooManyConnections(usize),
    #[error("too many connections from this address ({0})")]
    TooManyFromAddress(usize),
    #[error("server is full ({0} players)")]
    TooManyPlayers(usize),
    #[error("the name {0} is already online")]
    NameTaken(String),
    #[error("no character indices left")]
    IndicesExhausted,
    #[error("no player with index {0}")]
    UnknownPlayer(CharIndex),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("map {0} is not loaded")]
    MapNotLoaded(MapId),
    #[error("map {0} does not exist")]
    InvalidMap(MapId),
    #[error("cannot walk off the map")]
    OutOfBounds,
    #[error("the exit at {pos} leads to missing map {map}")]
    BrokenExit { pos: Position, map: MapId },
    #[error("tile {0} is blocked")]
    Blocked(Position),
    #[error("tile {pos} is taken by character {by}")]
    Occupied { pos: Position, by: CharIndex },
    #[error("no free tile near {pos} on map {map}")]
    NoFreeCell { map: MapId, pos: Position },
    #[error("character {0} is already on a map")]
    AlreadyOnMap(CharIndex),
    #[error("character {0} is not on any map")]
    NotOnMap(CharIndex),
    #[error("no player with index {0}")]
    UnknownPlayer(CharIndex),
    #[error("occupancy out of sync: {0}")]
    Inconsistent(String),
}

impl WorldError {
    /// Rejections caused by the move itself rather than by broken state.
    pub fn is_game_logic(&self) -> bool {
        matches!(
            self,
            WorldError::OutOfBounds
                | WorldError::Blocked(_)
                | WorldError::BrokenExit { .. }
                | WorldError::Occupied { .. }
                | WorldError::NoFreeCell { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("map {map}: cannot read {path}: {source}")]
    Io {
        map: MapId,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("map {map}: {detail}")]
    Corrupt { map: MapId, detail: String },
    #[error("map {0} not found")]
    NotFound(MapId),
    #[error("map loader worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("opcode {0} has no handler")]
    MissingHandler(ClientOpcode),
    #[error("opcode {0} is registered more than once")]
    DuplicateHandler(ClientOpcode),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("network error: {0}")]
    Io(#[from] io::Error),
}
