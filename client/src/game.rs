use log::{debug, info, warn};
use shared::commands::server::ServerCommand;
use shared::{CharIndex, Heading, MapId, Position};
use std::collections::HashMap;

/// A character the server told us about.
#[derive(Debug, Clone, PartialEq)]
pub struct Character {
    pub name: String,
    pub x: u8,
    pub y: u8,
    pub heading: Heading,
}

/// What the client knows about the world, built only from server commands
/// plus a predicted position for our own character.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub logged_in: bool,
    pub user_index: Option<u16>,
    pub char_index: Option<CharIndex>,
    pub map: Option<MapId>,
    pub characters: HashMap<CharIndex, Character>,
    /// Where we think we stand after moves the server has not answered yet.
    pub predicted: Option<Position>,
    pub console: Vec<String>,
    pub errors: Vec<String>,
    pub pongs: usize,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last position the server confirmed for our own character.
    pub fn confirmed_position(&self) -> Option<Position> {
        let index = self.char_index?;
        let me = self.characters.get(&index)?;
        Position::new(me.x, me.y)
    }

    /// Moves the predicted position one step without waiting for the server.
    pub fn apply_prediction(&mut self, heading: Heading) {
        let Some(from) = self.predicted.or_else(|| self.confirmed_position()) else {
            return;
        };
        if let Some(to) = from.step(heading) {
            self.predicted = Some(to);
        }
    }

    fn reconcile(&mut self, x: u8, y: u8) {
        let authoritative = Position::new(x, y);
        if self.predicted.is_some() && self.predicted != authoritative {
            debug!("Prediction corrected to ({}, {})", x, y);
        }
        self.predicted = authoritative;
    }

    pub fn apply_server_command(&mut self, command: &ServerCommand) {
        match command {
            ServerCommand::Logged(_) => {
                self.logged_in = true;
                info!("Logged in");
            }
            ServerCommand::UserIndexInServer(cmd) => self.user_index = Some(cmd.user_index),
            ServerCommand::UserCharIndexInServer(cmd) => self.char_index = Some(cmd.char_index),
            ServerCommand::ChangeMap(cmd) => {
                info!("Entering map {}", cmd.map);
                self.map = Some(cmd.map);
                self.characters.clear();
                self.predicted = None;
            }
            ServerCommand::PosUpdate(cmd) => {
                if let Some(me) = self.char_index.and_then(|i| self.characters.get_mut(&i)) {
                    me.x = cmd.x;
                    me.y = cmd.y;
                }
                self.reconcile(cmd.x, cmd.y);
            }
            ServerCommand::CharacterCreate(cmd) => {
                self.characters.insert(
                    cmd.char_index,
                    Character {
                        name: cmd.name.clone(),
                        x: cmd.x,
                        y: cmd.y,
                        heading: cmd.heading,
                    },
                );
                if Some(cmd.char_index) == self.char_index {
                    self.reconcile(cmd.x, cmd.y);
                }
            }
            ServerCommand::CharacterRemove(cmd) => {
                self.characters.remove(&cmd.char_index);
            }
            ServerCommand::CharacterMove(cmd) => {
                if let Some(character) = self.characters.get_mut(&cmd.char_index) {
                    character.x = cmd.x;
                    character.y = cmd.y;
                }
            }
            ServerCommand::CharacterChange(cmd) => {
                if let Some(character) = self.characters.get_mut(&cmd.char_index) {
                    character.heading = cmd.heading;
                }
            }
            ServerCommand::ChatOverHead(cmd) => {
                let speaker = self
                    .characters
                    .get(&cmd.char_index)
                    .map(|c| c.name.as_str())
                    .unwrap_or("?");
                info!("{}: {}", speaker, cmd.message);
            }
            ServerCommand::ConsoleMsg(cmd) => {
                info!("[console] {}", cmd.message);
                self.console.push(cmd.message.clone());
            }
            ServerCommand::ShowMessageBox(cmd) => info!("[message] {}", cmd.message),
            ServerCommand::ErrorMsg(cmd) => {
                warn!("Server error: {}", cmd.message);
                self.errors.push(cmd.message.clone());
            }
            ServerCommand::Pong(_) => self.pongs += 1,
            ServerCommand::ChangeInventorySlot(cmd) => debug!(
                "Slot {}: item {} x{} equipped={}",
                cmd.slot, cmd.item_id, cmd.amount, cmd.equipped
            ),
            ServerCommand::Disconnect(_) => {
                info!("Server asked us to disconnect");
                self.logged_in = false;
            }
        }
    }
}
