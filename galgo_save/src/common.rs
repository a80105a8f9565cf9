//! Primitive wire helpers. Everything on disk is little-endian and
//! fixed-width; strings are NUL-terminated UTF-8. Big-endian hosts byte-swap
//! on both read and write via `to_le_bytes`/`from_le_bytes`.

use std::io::{Read, Write};

use galgo_variant::Vec2;

use crate::SaveError;

// Value tags. A reference is written wherever a value aliases an actor or a
// component, which is what keeps cyclic graphs finite on disk.
pub const TAG_INT: u8 = 0;
pub const TAG_FLOAT: u8 = 1;
pub const TAG_BOOL: u8 = 2;
pub const TAG_STRING: u8 = 3;
pub const TAG_REFERENCE: u8 = 4;
pub const TAG_TABLE: u8 = 5;
pub const TAG_VEC2: u8 = 6;

/// Reference type name used for plain actor references.
pub const ACTOR_REF_NAME: &str = "Actor";

fn read_exact_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N], SaveError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u8<R: Read>(reader: &mut R) -> Result<u8, SaveError> {
    Ok(read_exact_array::<1, _>(reader)?[0])
}

pub fn read_bool<R: Read>(reader: &mut R) -> Result<bool, SaveError> {
    Ok(read_u8(reader)? != 0)
}

pub fn read_i32<R: Read>(reader: &mut R) -> Result<i32, SaveError> {
    Ok(i32::from_le_bytes(read_exact_array::<4, _>(reader)?))
}

pub fn read_i64<R: Read>(reader: &mut R) -> Result<i64, SaveError> {
    Ok(i64::from_le_bytes(read_exact_array::<8, _>(reader)?))
}

pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64, SaveError> {
    Ok(u64::from_le_bytes(read_exact_array::<8, _>(reader)?))
}

pub fn read_f32<R: Read>(reader: &mut R) -> Result<f32, SaveError> {
    Ok(f32::from_le_bytes(read_exact_array::<4, _>(reader)?))
}

pub fn read_vec2<R: Read>(reader: &mut R) -> Result<Vec2, SaveError> {
    let x = read_f32(reader)?;
    let y = read_f32(reader)?;
    Ok(Vec2::new(x, y))
}

pub fn read_string<R: Read>(reader: &mut R) -> Result<String, SaveError> {
    let mut bytes = Vec::new();
    loop {
        let byte = read_u8(reader)?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes)
        .map_err(|_| SaveError::Corrupt("string is not valid UTF-8".to_string()))
}

pub fn write_u8<W: Write>(writer: &mut W, value: u8) -> Result<(), SaveError> {
    writer.write_all(&[value])?;
    Ok(())
}

pub fn write_bool<W: Write>(writer: &mut W, value: bool) -> Result<(), SaveError> {
    write_u8(writer, value as u8)
}

pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> Result<(), SaveError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn write_i64<W: Write>(writer: &mut W, value: i64) -> Result<(), SaveError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<(), SaveError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn write_f32<W: Write>(writer: &mut W, value: f32) -> Result<(), SaveError> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn write_vec2<W: Write>(writer: &mut W, value: Vec2) -> Result<(), SaveError> {
    write_f32(writer, value.x)?;
    write_f32(writer, value.y)
}

pub fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<(), SaveError> {
    writer.write_all(value.as_bytes())?;
    writer.write_all(&[0])?;
    Ok(())
}
