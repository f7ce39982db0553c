//! The command table: one descriptor per client opcode.
//!
//! The table is built once at startup and must cover every declared opcode
//! exactly once. Opcodes without game logic still get a descriptor whose
//! handler refuses the command, so a gap in the table is always a
//! programming error and is reported before the server accepts anyone.

use crate::dispatch::Session;
use crate::error::{CodecError, CommandError};
use crate::handlers;
use shared::{ClientOpcode, FrameBuffer};

/// Handlers read the opcode byte and exactly their own fields.
pub type Handler = fn(&mut Session<'_>, &mut FrameBuffer) -> Result<(), CommandError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    /// Only before login.
    Unauthenticated,
    /// Only after login.
    Authenticated,
}

impl AuthRequirement {
    pub fn check(self, opcode: ClientOpcode, authenticated: bool) -> Result<(), CommandError> {
        match (self, authenticated) {
            (AuthRequirement::Authenticated, false) => Err(CommandError::NotAuthenticated(opcode)),
            (AuthRequirement::Unauthenticated, true) => {
                Err(CommandError::AlreadyAuthenticated(opcode))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy)]
pub struct CommandDescriptor {
    pub opcode: ClientOpcode,
    pub auth: AuthRequirement,
    pub handler: Handler,
}

impl CommandDescriptor {
    pub fn new(opcode: ClientOpcode, auth: AuthRequirement, handler: Handler) -> Self {
        Self {
            opcode,
            auth,
            handler,
        }
    }
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("opcode", &self.opcode)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct CommandCodec {
    table: Vec<CommandDescriptor>,
}

impl CommandCodec {
    /// Builds the table, failing on any missing or duplicated opcode.
    pub fn new<I>(descriptors: I) -> Result<Self, CodecError>
    where
        I: IntoIterator<Item = CommandDescriptor>,
    {
        let mut slots: Vec<Option<CommandDescriptor>> = vec![None; ClientOpcode::ALL.len()];
        for descriptor in descriptors {
            let slot = &mut slots[usize::from(descriptor.opcode.as_u8())];
            if slot.is_some() {
                return Err(CodecError::DuplicateHandler(descriptor.opcode));
            }
            *slot = Some(descriptor);
        }

        let table = slots
            .into_iter()
            .zip(ClientOpcode::ALL)
            .map(|(slot, opcode)| slot.ok_or(CodecError::MissingHandler(*opcode)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { table })
    }

    /// The server's own handler set.
    pub fn standard() -> Result<Self, CodecError> {
        Self::new(handlers::descriptors())
    }

    /// `None` for bytes outside the declared opcode range.
    pub fn lookup(&self, raw: u8) -> Option<&CommandDescriptor> {
        self.table.get(usize::from(raw))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
