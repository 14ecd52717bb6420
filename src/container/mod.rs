//! Container (`.lif`) structure: block codec and block index reader.
//!
//! The reader only walks block headers. Payloads are skipped with a seek so
//! opening a multi-gigabyte container costs a handful of small reads.

pub mod block;

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian as LE, ReadBytesExt};

use crate::error::{MicroImgError, Result};

pub use block::{
    decode_utf16_le, encode_utf16_le, write_memory_block, write_xml_block, BLOCK_MARKER,
    BLOCK_TAG, PLACEHOLDER_BLOCK_ID,
};

/// One memory block found in a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlock {
    /// Block identifier, e.g. `MemBlock_233`.
    pub block_id: String,
    /// Declared payload size in bytes.
    pub memory_size: u64,
    /// Absolute offset of the payload.
    pub position: u64,
}

/// Parsed block structure of a container file.
#[derive(Debug, Clone)]
pub struct ContainerIndex {
    path: PathBuf,
    xml: String,
    blocks: Vec<MemoryBlock>,
}

impl ContainerIndex {
    /// Open a container file and index its blocks.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            MicroImgError::UnavailableSource(format!("{}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file), path)
    }

    /// Index blocks from any seekable reader.
    pub fn from_reader<R: Read + Seek>(mut reader: R, path: &Path) -> Result<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        expect_block_start(&mut reader, path)?;
        let units = reader.read_u32::<LE>()? as usize;
        let mut text = vec![0u8; units * 2];
        let text_len = text.len() as u64;
        reader
            .read_exact(&mut text)
            .map_err(|e| MicroImgError::io_at("reading header XML", 13, text_len, e))?;
        let xml = decode_utf16_le(&text).ok_or_else(|| {
            MicroImgError::InvalidFormat(format!("{}: header XML is not UTF-16", path.display()))
        })?;

        let mut blocks = Vec::new();
        let mut position = reader.stream_position()?;
        while position < file_len {
            expect_block_start(&mut reader, path)?;
            let memory_size = reader.read_u64::<LE>()?;
            if reader.read_u8()? != BLOCK_MARKER {
                return Err(invalid(path, "missing marker after memory size"));
            }
            let units = reader.read_u32::<LE>()? as usize;
            let mut name = vec![0u8; units * 2];
            reader.read_exact(&mut name)?;
            let block_id = decode_utf16_le(&name)
                .ok_or_else(|| invalid(path, "block identifier is not UTF-16"))?;

            let payload = reader.stream_position()?;
            if payload + memory_size > file_len {
                return Err(invalid(
                    path,
                    &format!("block {} truncated ({} bytes declared)", block_id, memory_size),
                ));
            }
            log::debug!("Block {} at {} ({} bytes)", block_id, payload, memory_size);
            blocks.push(MemoryBlock {
                block_id,
                memory_size,
                position: payload,
            });

            position = reader.seek(SeekFrom::Start(payload + memory_size))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            xml,
            blocks,
        })
    }

    /// Path the index was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header XML text.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// Memory blocks in file order.
    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.blocks
    }

    /// Look up a block by identifier.
    pub fn block(&self, block_id: &str) -> Option<&MemoryBlock> {
        self.blocks.iter().find(|b| b.block_id == block_id)
    }
}

fn expect_block_start<R: Read>(reader: &mut R, path: &Path) -> Result<()> {
    if reader.read_u32::<LE>()? != BLOCK_TAG {
        return Err(invalid(path, "block tag mismatch"));
    }
    let _length = reader.read_u32::<LE>()?;
    if reader.read_u8()? != BLOCK_MARKER {
        return Err(invalid(path, "block marker mismatch"));
    }
    Ok(())
}

fn invalid(path: &Path, what: &str) -> MicroImgError {
    MicroImgError::InvalidFormat(format!("{}: {}", path.display(), what))
}
