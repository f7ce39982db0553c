//! Commands a client sends to the server.

use crate::opcodes::ClientOpcode;
use crate::Heading;

wire_commands! {
    /// Any client command with a known payload layout.
    ClientCommand: ClientOpcode {
        /// Logs in with a character name; the character is created on the
        /// spot since nothing is persisted.
        LoginExistingChar {
            name: String,
            password: String,
            version_major: u8,
            version_minor: u8,
            version_patch: u8,
        },
        Talk { message: String },
        Yell { message: String },
        Whisper { target: u16, message: String },
        Walk { heading: Heading },
        RequestPositionUpdate {},
        EquipItem { slot: u8 },
        ChangeHeading { heading: Heading },
        Online {},
        Quit {},
        UpTime {},
        Ping {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameBuffer;

    #[test]
    fn test_walk_layout() {
        let mut buf = FrameBuffer::new();
        Walk {
            heading: Heading::North,
        }
        .write(&mut buf);

        assert_eq!(buf.unread(), &[ClientOpcode::Walk.as_u8(), 1]);
    }

    #[test]
    fn test_login_round_trip() {
        let login = LoginExistingChar {
            name: "Ana".to_string(),
            password: "secret".to_string(),
            version_major: 0,
            version_minor: 13,
            version_patch: 0,
        };
        let mut buf = FrameBuffer::new();
        login.write(&mut buf);

        let decoded = ClientCommand::read(&mut buf).unwrap();
        assert_eq!(decoded, ClientCommand::LoginExistingChar(login));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_rejects_other_opcode() {
        let mut buf = FrameBuffer::from_bytes(&[ClientOpcode::Ping.as_u8()]);
        assert!(matches!(
            Walk::read(&mut buf),
            Err(crate::BufferError::Malformed(_))
        ));
    }

    #[test]
    fn test_declared_opcode_without_layout() {
        let mut buf = FrameBuffer::from_bytes(&[ClientOpcode::Attack.as_u8()]);
        assert!(matches!(
            ClientCommand::read(&mut buf),
            Err(crate::BufferError::Malformed(_))
        ));
    }

    #[test]
    fn test_partial_command_is_insufficient() {
        let mut full = FrameBuffer::new();
        Talk {
            message: "hola".to_string(),
        }
        .write(&mut full);
        let bytes = full.take_all();

        let mut buf = FrameBuffer::from_bytes(&bytes[..bytes.len() - 1]);
        let err = ClientCommand::read(&mut buf).unwrap_err();
        assert!(err.is_insufficient());
    }
}
