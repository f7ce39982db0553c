use crate::connection::ConnectionId;
use shared::ServerCommand;

/// Commands produced while handling one event, in the order they were
/// produced. The server routes them to connection buffers afterwards.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(ConnectionId, ServerCommand)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: ConnectionId, command: impl Into<ServerCommand>) {
        self.messages.push((to, command.into()));
    }

    pub fn send_all<I>(&mut self, targets: I, command: impl Into<ServerCommand>)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        let command = command.into();
        for to in targets {
            self.messages.push((to, command.clone()));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, (ConnectionId, ServerCommand)> {
        self.messages.drain(..)
    }

    /// Commands queued for one connection.
    pub fn for_connection(&self, id: ConnectionId) -> Vec<&ServerCommand> {
        self.messages
            .iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, command)| command)
            .collect()
    }
}
