//! The dispatch loop: turns an inbound byte buffer into executed commands.
//!
//! For every command in the buffer:
//! 1. Peek the opcode and look it up. Unknown opcodes are fatal.
//! 2. Check the connection's authentication state against the descriptor.
//! 3. `mark()`, run the handler, and `commit()` as soon as it returns.
//!
//! Committing after each command means a command that was executed is never
//! parsed again, even when the next command in the same batch is only
//! partially delivered. Failures are classified through
//! [`CommandError::kind`]:
//!
//! | kind         | buffer   | loop                         |
//! |--------------|----------|------------------------------|
//! | `Incomplete` | rollback | stop, wait for more bytes    |
//! | `GameLogic`  | commit   | continue with next command   |
//! | `Deferred`   | rollback | stop, park until map loads   |
//! | fatal kinds  | rollback | stop, caller closes the peer |

use crate::codec::CommandCodec;
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{CommandError, ErrorKind};
use crate::outbox::Outbox;
use crate::player::NameRules;
use crate::registry::Registry;
use crate::world::WorldMapSet;
use log::{debug, trace};
use shared::{CharIndex, FrameBuffer, MapId, ServerCommand};
use std::time::Instant;

/// Everything a handler may read or change while running one command.
///
/// The connection's inbound buffer is lent to the dispatch loop separately
/// and is empty here while a handler runs.
pub struct Session<'a> {
    pub connection: &'a mut Connection,
    pub registry: &'a mut Registry,
    pub world: &'a mut WorldMapSet,
    pub config: &'a ServerConfig,
    pub names: &'a NameRules,
    pub outbox: &'a mut Outbox,
    pub started: Instant,
}

impl Session<'_> {
    /// Queues a command for this session's own connection.
    pub fn reply(&mut self, command: impl Into<ServerCommand>) {
        self.outbox.send(self.connection.id, command);
    }

    /// The logged-in character. Handlers gated on authentication can rely
    /// on this succeeding.
    pub fn player_index(&self) -> Result<CharIndex, CommandError> {
        self.connection
            .player
            .ok_or_else(|| CommandError::Internal("no player bound to connection".into()))
    }
}

/// Why a dispatch pass stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// The buffer is empty or holds only part of the next command.
    Drained,
    /// The next command waits for a map to load.
    Parked(MapId),
    /// A handler asked for the connection to be closed.
    CloseRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Commands consumed, including ones a game rule rejected.
    pub executed: usize,
    pub halt: Halt,
}

/// Runs every complete command in `buf`.
///
/// On a fatal error the buffer is rolled back to the start of the failing
/// command and the error is returned; the caller must close the connection.
pub fn dispatch(
    codec: &CommandCodec,
    buf: &mut FrameBuffer,
    session: &mut Session<'_>,
) -> Result<DispatchReport, CommandError> {
    let mut executed = 0;

    while !buf.is_empty() {
        let raw = buf.peek_u8()?;
        let descriptor = codec.lookup(raw).ok_or(CommandError::UnknownOpcode(raw))?;
        descriptor
            .auth
            .check(descriptor.opcode, session.connection.is_authenticated())?;

        buf.mark();
        match (descriptor.handler)(session, buf) {
            Ok(()) => {
                buf.commit();
                executed += 1;
                trace!("Connection {}: {} done", session.connection.id, descriptor.opcode);
            }
            Err(err) => match err.kind() {
                ErrorKind::Incomplete => {
                    buf.rollback();
                    return Ok(DispatchReport {
                        executed,
                        halt: Halt::Drained,
                    });
                }
                ErrorKind::GameLogic => {
                    buf.commit();
                    executed += 1;
                    debug!(
                        "Connection {}: {} rejected: {}",
                        session.connection.id, descriptor.opcode, err
                    );
                }
                ErrorKind::Deferred => {
                    buf.rollback();
                    let Some(map) = err.deferred_map() else {
                        return Err(err);
                    };
                    return Ok(DispatchReport {
                        executed,
                        halt: Halt::Parked(map),
                    });
                }
                ErrorKind::Malformed
                | ErrorKind::Violation
                | ErrorKind::Refused
                | ErrorKind::Internal => {
                    buf.rollback();
                    return Err(err);
                }
            },
        }

        if session.connection.close_requested() {
            return Ok(DispatchReport {
                executed,
                halt: Halt::CloseRequested,
            });
        }
    }

    Ok(DispatchReport {
        executed,
        halt: Halt::Drained,
    })
}
