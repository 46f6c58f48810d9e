use std::io::{Read, Result, Write};

use crate::error::Error;

/// Longest string accepted by [`read_string`], a sanity cap against
/// garbled length prefixes
const MAX_STRING_LEN: usize = 1 << 20;

/// Write a u32-length-prefixed UTF-8 string
pub(crate) fn write_string<W: Write>(writer: &mut W, s: &str) -> crate::error::Result<()> {
    writer.write_u32_le(s.len() as u32)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// Read a u32-length-prefixed UTF-8 string
pub(crate) fn read_string<R: Read>(reader: &mut R) -> crate::error::Result<String> {
    let len = reader.read_u32_le()? as usize;
    if len > MAX_STRING_LEN {
        return Err(Error::Parse(format!("string length {len} out of range")));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| Error::Parse("string is not valid UTF-8".into()))
}

/// Extension trait for reading little-endian values from a reader
pub trait ReadExt: Read {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16_le(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_f32_le(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }
}

/// Extension trait for writing little-endian values to a writer
pub trait WriteExt: Write {
    fn write_u8(&mut self, n: u8) -> Result<()> {
        self.write_all(&[n])
    }

    fn write_u16_le(&mut self, n: u16) -> Result<()> {
        self.write_all(&n.to_le_bytes())
    }

    fn write_u32_le(&mut self, n: u32) -> Result<()> {
        self.write_all(&n.to_le_bytes())
    }

    fn write_f32_le(&mut self, n: f32) -> Result<()> {
        self.write_all(&n.to_le_bytes())
    }
}

impl<R: Read + ?Sized> ReadExt for R {}
impl<W: Write + ?Sized> WriteExt for W {}
