//! Field-level encoding shared by every command struct.

use crate::buffer::{BufferError, FrameBuffer};
use crate::Heading;

/// A value that can travel as a command field.
pub trait WireField: Sized {
    fn read_from(buf: &mut FrameBuffer) -> Result<Self, BufferError>;
    fn write_to(&self, buf: &mut FrameBuffer);
}

macro_rules! numeric_fields {
    ($($ty:ty => $read:ident, $write:ident;)*) => {
        $(
            impl WireField for $ty {
                fn read_from(buf: &mut FrameBuffer) -> Result<Self, BufferError> {
                    buf.$read()
                }

                fn write_to(&self, buf: &mut FrameBuffer) {
                    buf.$write(*self);
                }
            }
        )*
    };
}

numeric_fields! {
    u8 => read_u8, write_u8;
    i8 => read_i8, write_i8;
    u16 => read_u16, write_u16;
    i16 => read_i16, write_i16;
    u32 => read_u32, write_u32;
    i32 => read_i32, write_i32;
    f32 => read_f32, write_f32;
    f64 => read_f64, write_f64;
}

impl WireField for String {
    fn read_from(buf: &mut FrameBuffer) -> Result<Self, BufferError> {
        buf.read_string()
    }

    fn write_to(&self, buf: &mut FrameBuffer) {
        buf.write_string(self);
    }
}

impl WireField for bool {
    fn read_from(buf: &mut FrameBuffer) -> Result<Self, BufferError> {
        Ok(buf.read_u8()? != 0)
    }

    fn write_to(&self, buf: &mut FrameBuffer) {
        buf.write_u8(u8::from(*self));
    }
}

impl WireField for Heading {
    fn read_from(buf: &mut FrameBuffer) -> Result<Self, BufferError> {
        let raw = buf.read_u8()?;
        Heading::from_u8(raw).ok_or_else(|| BufferError::Malformed(format!("heading {raw}")))
    }

    fn write_to(&self, buf: &mut FrameBuffer) {
        buf.write_u8(self.as_u8());
    }
}
