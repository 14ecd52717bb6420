//! Block codec for the Container (`.lif`) layout.
//!
//! Every block starts with a little-endian `u32` tag (`0x70`), a `u32` length
//! of the rest of the block and a `0x2A` marker byte. The header block then
//! carries the XML description as UTF-16LE; memory blocks carry the declared
//! payload size and the block identifier.

use std::io::{self, Write};

use byteorder::{LittleEndian as LE, WriteBytesExt};

/// Tag opening every block.
pub const BLOCK_TAG: u32 = 0x70;

/// Marker byte following block headers and memory sizes.
pub const BLOCK_MARKER: u8 = 0x2A;

/// Identifier of the zero-size memory block owned by the wrapping element.
pub const PLACEHOLDER_BLOCK_ID: &str = "MemBlock_221";

/// Encode text as UTF-16LE without byte order mark.
pub fn encode_utf16_le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Decode UTF-16LE bytes, dropping a leading byte order mark.
pub fn decode_utf16_le(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let units = match units.first() {
        Some(0xFEFF) => &units[1..],
        _ => &units[..],
    };
    String::from_utf16(units).ok()
}

fn block_length(payload: usize, fixed: usize) -> io::Result<u32> {
    u32::try_from(payload + fixed).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("block of {} bytes exceeds the 32-bit length field", payload + fixed),
        )
    })
}

/// Write the XML header block. Returns the number of bytes written.
pub fn write_xml_block<W: Write>(writer: &mut W, xml: &str) -> io::Result<u64> {
    let text = encode_utf16_le(xml);
    let length = block_length(text.len(), 1 + 4)?;
    let units = (text.len() / 2) as u32;

    writer.write_u32::<LE>(BLOCK_TAG)?;
    writer.write_u32::<LE>(length)?;
    writer.write_u8(BLOCK_MARKER)?;
    writer.write_u32::<LE>(units)?;
    writer.write_all(&text)?;

    Ok(4 + 4 + length as u64)
}

/// Write a memory block descriptor (without payload). Returns bytes written.
pub fn write_memory_block<W: Write>(
    writer: &mut W,
    block_id: &str,
    memory_size: u64,
) -> io::Result<u64> {
    let name = encode_utf16_le(block_id);
    let length = block_length(name.len(), 1 + 8 + 1 + 4)?;
    let units = (name.len() / 2) as u32;

    writer.write_u32::<LE>(BLOCK_TAG)?;
    writer.write_u32::<LE>(length)?;
    writer.write_u8(BLOCK_MARKER)?;
    writer.write_u64::<LE>(memory_size)?;
    writer.write_u8(BLOCK_MARKER)?;
    writer.write_u32::<LE>(units)?;
    writer.write_all(&name)?;

    Ok(4 + 4 + length as u64)
}
