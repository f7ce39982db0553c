//! Typed command structs for both directions.
//!
//! Each command is a plain struct whose fields are encoded in declaration
//! order after the opcode byte. `read` consumes the opcode byte and exactly
//! the declared fields; nothing else knows a command's length.

macro_rules! wire_commands {
    (
        $(#[$enum_meta:meta])*
        $enum_name:ident: $opcode:ident {
            $(
                $(#[$meta:meta])*
                $name:ident { $($field:ident : $ty:ty),* $(,)? }
            ),* $(,)?
        }
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name {
                $(pub $field: $ty,)*
            }

            impl $name {
                pub const OPCODE: $opcode = $opcode::$name;

                pub fn read(
                    buf: &mut $crate::buffer::FrameBuffer,
                ) -> Result<Self, $crate::buffer::BufferError> {
                    let raw = buf.read_u8()?;
                    if raw != Self::OPCODE.as_u8() {
                        return Err($crate::buffer::BufferError::Malformed(format!(
                            "expected opcode {}, found {}",
                            Self::OPCODE,
                            raw
                        )));
                    }
                    $(let $field = <$ty as $crate::wire::WireField>::read_from(buf)?;)*
                    Ok(Self { $($field,)* })
                }

                pub fn write(&self, buf: &mut $crate::buffer::FrameBuffer) {
                    buf.write_u8(Self::OPCODE.as_u8());
                    $($crate::wire::WireField::write_to(&self.$field, buf);)*
                }
            }

            impl From<$name> for $enum_name {
                fn from(command: $name) -> Self {
                    $enum_name::$name(command)
                }
            }
        )*

        $(#[$enum_meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $enum_name {
            $($name($name),)*
        }

        impl $enum_name {
            pub fn opcode(&self) -> $opcode {
                match self {
                    $($enum_name::$name(_) => $opcode::$name,)*
                }
            }

            pub fn write(&self, buf: &mut $crate::buffer::FrameBuffer) {
                match self {
                    $($enum_name::$name(command) => command.write(buf),)*
                }
            }

            /// Encodes this command on its own.
            pub fn to_bytes(&self) -> bytes::Bytes {
                let mut buf = $crate::buffer::FrameBuffer::new();
                self.write(&mut buf);
                buf.take_all()
            }

            /// Decodes whichever command the next opcode byte announces.
            pub fn read(
                buf: &mut $crate::buffer::FrameBuffer,
            ) -> Result<Self, $crate::buffer::BufferError> {
                let raw = buf.peek_u8()?;
                match $opcode::from_u8(raw) {
                    $(Some($opcode::$name) => $name::read(buf).map($enum_name::$name),)*
                    Some(other) => Err($crate::buffer::BufferError::Malformed(format!(
                        "no payload layout for {}",
                        other
                    ))),
                    None => Err($crate::buffer::BufferError::Malformed(format!(
                        "unknown opcode {}",
                        raw
                    ))),
                }
            }
        }
    };
}

pub mod client;
pub mod server;
