//! Commands the server sends to clients.

use crate::opcodes::ServerOpcode;
use crate::Heading;

wire_commands! {
    /// Any server command with a known payload layout.
    ServerCommand: ServerOpcode {
        Logged { user_class: u8 },
        Disconnect {},
        ChangeMap { map: u16, version: u16 },
        /// Authoritative position of the receiving player.
        PosUpdate { x: u8, y: u8 },
        ChatOverHead {
            message: String,
            char_index: u16,
            red: u8,
            green: u8,
            blue: u8,
        },
        ConsoleMsg { message: String, font: u8 },
        ShowMessageBox { message: String },
        UserIndexInServer { user_index: u16 },
        UserCharIndexInServer { char_index: u16 },
        CharacterCreate {
            char_index: u16,
            body: u16,
            head: u16,
            heading: Heading,
            x: u8,
            y: u8,
            weapon: u16,
            shield: u16,
            helmet: u16,
            fx: u16,
            fx_loops: u16,
            name: String,
            nick_color: u8,
            privileges: u8,
        },
        CharacterRemove { char_index: u16 },
        CharacterMove { char_index: u16, x: u8, y: u8 },
        CharacterChange {
            char_index: u16,
            body: u16,
            head: u16,
            heading: Heading,
            weapon: u16,
            shield: u16,
            helmet: u16,
            fx: u16,
            fx_loops: u16,
        },
        ChangeInventorySlot { slot: u8, item_id: u16, amount: u16, equipped: bool },
        ErrorMsg { message: String },
        Pong {},
    }
}

/// Console font used for plain informational lines.
pub const FONT_INFO: u8 = 0;
/// Console font used for server announcements.
pub const FONT_SERVER: u8 = 1;

impl ConsoleMsg {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            font: FONT_INFO,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            font: FONT_SERVER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameBuffer;

    #[test]
    fn test_console_fonts() {
        assert_eq!(ConsoleMsg::info("hola").font, FONT_INFO);
        assert_eq!(ConsoleMsg::server("hola").font, FONT_SERVER);
    }

    #[test]
    fn test_character_move_layout() {
        let bytes = ServerCommand::from(CharacterMove {
            char_index: 0x0102,
            x: 50,
            y: 49,
        })
        .to_bytes();

        assert_eq!(
            &bytes[..],
            &[ServerOpcode::CharacterMove.as_u8(), 0x02, 0x01, 50, 49]
        );
    }

    #[test]
    fn test_stream_of_commands_decodes_in_order() {
        let mut buf = FrameBuffer::new();
        ServerCommand::from(Logged { user_class: 1 }).write(&mut buf);
        ServerCommand::from(ConsoleMsg::info("bienvenido")).write(&mut buf);
        ServerCommand::from(Pong {}).write(&mut buf);

        assert_eq!(
            ServerCommand::read(&mut buf).unwrap(),
            ServerCommand::Logged(Logged { user_class: 1 })
        );
        assert_eq!(
            ServerCommand::read(&mut buf).unwrap().opcode(),
            ServerOpcode::ConsoleMsg
        );
        assert_eq!(ServerCommand::read(&mut buf).unwrap(), ServerCommand::Pong(Pong {}));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_inventory_slot_flag() {
        let mut buf = FrameBuffer::new();
        ChangeInventorySlot {
            slot: 3,
            item_id: 400,
            amount: 1,
            equipped: true,
        }
        .write(&mut buf);

        let decoded = ChangeInventorySlot::read(&mut buf).unwrap();
        assert!(decoded.equipped);
        assert_eq!(decoded.item_id, 400);
    }
}
