//! Sub-container writer: one image of a container as a standalone `.lif`.
//!
//! The output holds a synthesized XML header block, a zero-size placeholder
//! memory block, the descriptor of the real memory block and the payload
//! copied verbatim from the source in bounded chunks.
//!
//! # Example
//!
//! ```rust,ignore
//! use microimg_extract::config::{OutputConfig, WriterConfig};
//! use microimg_extract::progress::NullProgress;
//! use microimg_extract::writer::SubContainerWriter;
//!
//! let writer = SubContainerWriter::new(WriterConfig::default());
//! let outcome = writer.write_single_image(&record, &OutputConfig::new("out"), &NullProgress)?;
//! println!("wrote {}", outcome.path.display());
//! ```

pub mod xml;

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{OutputConfig, WriterConfig};
use crate::container::{write_memory_block, write_xml_block, PLACEHOLDER_BLOCK_ID};
use crate::error::{MicroImgError, Result};
use crate::metadata::{ElementDescriptor, MetadataRecord};
use crate::progress::{CompletionSummary, ProgressEvent, ProgressHandler, ProgressPhase};

pub use xml::{build_header_xml, normalize_xml, rename_element};

/// First and last percentage of the payload copy range.
const COPY_START_PERCENT: u8 = 40;
const COPY_END_PERCENT: u8 = 95;

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    /// File name of the new container (`<save name>.lif`).
    pub file_name: String,
    /// Full path of the new container.
    pub path: PathBuf,
    /// Path of the secondary copy, when one was requested.
    pub alt_path: Option<PathBuf>,
}

/// Split `size` bytes into chunks of at most `chunk_size`.
pub fn plan_chunks(size: u64, chunk_size: u64) -> Vec<u64> {
    let chunk_size = chunk_size.max(1);
    let full = size / chunk_size;
    let mut chunks = vec![chunk_size; full as usize];
    if size % chunk_size != 0 {
        chunks.push(size % chunk_size);
    }
    chunks
}

/// Progress percentage after copying chunk `index` (0-based) of `total_chunks`.
///
/// Chunks spread evenly over 40..=95, so the last one always reports 95.
pub fn chunk_percent(index: usize, total_chunks: usize) -> u8 {
    if index + 1 >= total_chunks {
        return COPY_END_PERCENT;
    }
    let span = (COPY_END_PERCENT - COPY_START_PERCENT) as usize;
    let percent = COPY_START_PERCENT as usize + (index + 1) * span / total_chunks;
    percent.min(COPY_END_PERCENT as usize) as u8
}

/// Writes single-image containers.
#[derive(Debug, Clone, Default)]
pub struct SubContainerWriter {
    config: WriterConfig,
}

impl SubContainerWriter {
    /// Create a writer.
    pub fn new(config: WriterConfig) -> Self {
        Self { config }
    }

    /// Write the image described by `record` as `<save name>.lif`.
    ///
    /// The file goes into `output`'s primary folder (by default next to
    /// the source) and is copied byte for byte into the secondary folder
    /// when one is set. Failures are reported to `progress` and returned;
    /// a partially written file may be left behind.
    ///
    /// # Arguments
    ///
    /// * `record` - Image record carrying a complete element descriptor
    /// * `output` - Output folders
    /// * `progress` - Progress sink, also polled for cancellation between chunks
    pub fn write_single_image(
        &self,
        record: &MetadataRecord,
        output: &OutputConfig,
        progress: &dyn ProgressHandler,
    ) -> Result<WriteOutcome> {
        let mut target = None;
        let result = self.write_inner(record, output, progress, &mut target);
        match &result {
            Ok(outcome) => {
                progress.on_progress(&ProgressEvent::complete("Image saved").with_file(&outcome.path));
                progress.on_complete(&CompletionSummary {
                    completed: 1,
                    failed: 0,
                    bytes: record.element.as_ref().map_or(0, |e| e.memory_size),
                    output: Some(outcome.path.clone()),
                });
            }
            Err(e) => {
                log::error!("Writing {:?} failed: {}", record.name, e);
                progress.on_error(e, target.as_deref());
            }
        }
        result
    }

    fn write_inner(
        &self,
        record: &MetadataRecord,
        output: &OutputConfig,
        progress: &dyn ProgressHandler,
        target: &mut Option<PathBuf>,
    ) -> Result<WriteOutcome> {
        progress.on_progress(&ProgressEvent::new(ProgressPhase::ReadingMetadata, 5));
        let element = validate_element(record)?;

        progress.on_progress(&ProgressEvent::new(ProgressPhase::ProcessingMetadata, 10));
        let fragment = rename_element(&element.xml_fragment, &element.name, &element.save_name)?;

        let out_dir = output.resolve_output_dir(&record.file_path);
        fs::create_dir_all(&out_dir)?;
        let file_name = format!("{}.lif", element.save_name);
        let path = out_dir.join(&file_name);
        *target = Some(path.clone());

        let uuid = uuid::Uuid::new_v4().to_string();
        let header = normalize_xml(&build_header_xml(
            &element.save_name,
            &path.to_string_lossy(),
            &uuid,
            &fragment,
        ));

        log::info!(
            "Writing {} ({} payload bytes from {})",
            path.display(),
            element.memory_size,
            record.file_path.display()
        );
        self.write_container(record, element, &header, &path, progress)?;

        let alt_path = match &output.alt_output_dir {
            Some(alt_dir) => {
                fs::create_dir_all(alt_dir)?;
                let alt_path = alt_dir.join(&file_name);
                fs::copy(&path, &alt_path)
                    .map_err(|e| MicroImgError::io_at("copying to secondary folder", 0, element.memory_size, e))?;
                log::info!("Copied {} to {}", file_name, alt_path.display());
                Some(alt_path)
            }
            None => None,
        };

        log::info!("Finished {}", path.display());
        Ok(WriteOutcome {
            file_name,
            path,
            alt_path,
        })
    }

    /// Header, block descriptors and payload. The destination handle lives
    /// only inside this call.
    fn write_container(
        &self,
        record: &MetadataRecord,
        element: &ElementDescriptor,
        header: &str,
        path: &Path,
        progress: &dyn ProgressHandler,
    ) -> Result<()> {
        let mut source = File::open(&record.file_path).map_err(|e| {
            MicroImgError::io_at("opening source", element.position, element.memory_size, e)
        })?;
        let file = File::create(path)
            .map_err(|e| MicroImgError::io_at("creating destination", 0, 0, e))?;
        let mut out = BufWriter::new(file);

        progress.on_progress(&ProgressEvent::new(ProgressPhase::WritingHeader, 30).with_file(path));
        let mut written = write_xml_block(&mut out, header)
            .map_err(|e| MicroImgError::io_at("writing XML header", 0, header.len() as u64, e))?;

        progress.on_progress(&ProgressEvent::new(ProgressPhase::WritingStructure, 40).with_file(path));
        written += write_memory_block(&mut out, PLACEHOLDER_BLOCK_ID, 0)
            .map_err(|e| MicroImgError::io_at("writing placeholder block", written, 0, e))?;
        written += write_memory_block(&mut out, &element.block_id, element.memory_size)
            .map_err(|e| MicroImgError::io_at("writing memory block", written, 0, e))?;

        self.copy_payload(&mut source, &mut out, element, progress)?;

        out.flush()
            .map_err(|e| MicroImgError::io_at("flushing destination", written, element.memory_size, e))?;
        Ok(())
    }

    fn copy_payload<R: Read + Seek, W: Write>(
        &self,
        source: &mut R,
        out: &mut W,
        element: &ElementDescriptor,
        progress: &dyn ProgressHandler,
    ) -> Result<()> {
        let size = element.memory_size;
        if size == 0 {
            progress.on_progress(
                &ProgressEvent::new(ProgressPhase::CopyingPayload, COPY_END_PERCENT)
                    .with_message("No data to copy"),
            );
            return Ok(());
        }

        source
            .seek(SeekFrom::Start(element.position))
            .map_err(|e| MicroImgError::io_at("seeking payload", element.position, size, e))?;

        let chunks = plan_chunks(size, self.config.chunk_size);
        let mut buffer = vec![0u8; chunks[0] as usize];
        let mut copied = 0u64;

        for (i, &len) in chunks.iter().enumerate() {
            if progress.is_cancelled() {
                log::info!("Payload copy cancelled after {} of {} bytes", copied, size);
                return Err(MicroImgError::Cancelled);
            }
            let at = element.position + copied;
            let chunk = &mut buffer[..len as usize];
            source
                .read_exact(chunk)
                .map_err(|e| MicroImgError::io_at("reading payload", at, len, e))?;
            out.write_all(chunk)
                .map_err(|e| MicroImgError::io_at("writing payload", at, len, e))?;
            copied += len;

            log::debug!("Copied chunk {}/{} ({} bytes)", i + 1, chunks.len(), len);
            progress.on_progress(&ProgressEvent::copying(
                chunk_percent(i, chunks.len()),
                i + 1,
                chunks.len(),
                copied,
                size,
            ));
        }
        Ok(())
    }
}

fn validate_element(record: &MetadataRecord) -> Result<&ElementDescriptor> {
    let element = record.element.as_ref().ok_or_else(|| {
        MicroImgError::MalformedMetadata(format!("{:?} has no element descriptor", record.name))
    })?;
    if element.block_id.is_empty() {
        return Err(MicroImgError::MalformedMetadata("empty memory block identifier".into()));
    }
    if element.xml_fragment.trim().is_empty() {
        return Err(MicroImgError::MalformedMetadata("empty element XML".into()));
    }
    if element.save_name.is_empty() {
        return Err(MicroImgError::MalformedMetadata("empty save name".into()));
    }
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerIndex;
    use crate::metadata::{Dims, DisplayRange, FileType, Strides};
    use crate::progress::{CallbackProgress, ChannelProgress, NullProgress};
    use tempfile::TempDir;

    const FRAGMENT: &str = r#"<Element Name="Series001" Visibility="1">
        <Data><Image/></Data>
        <Memory MemoryBlockID="MemBlock_7" Size="24"/>
    </Element>"#;

    fn source(dir: &Path, payload: &[u8]) -> (PathBuf, u64) {
        let mut bytes = vec![0xAB; 37];
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(&[0xCD; 11]);
        let path = dir.join("source.lif");
        fs::write(&path, bytes).unwrap();
        (path, 37)
    }

    fn record(path: PathBuf, position: u64, size: u64) -> MetadataRecord {
        MetadataRecord {
            filetype: FileType::Container,
            file_path: path,
            base_position: position,
            dims: Dims::default(),
            isrgb: false,
            channel_bits: vec![8],
            strides: Strides::default(),
            display: DisplayRange::default(),
            lut_names: Vec::new(),
            overlap_is_negative: false,
            name: "Series001".into(),
            uuid: String::new(),
            element: Some(ElementDescriptor {
                name: "Series001".into(),
                xml_fragment: FRAGMENT.into(),
                block_id: "MemBlock_7".into(),
                memory_size: size,
                position,
                save_name: "source_Series001".into(),
            }),
        }
    }

    fn small_chunks() -> SubContainerWriter {
        SubContainerWriter::new(WriterConfig { chunk_size: 10 })
    }

    #[test]
    fn test_plan_chunks() {
        let chunks = plan_chunks(61_440_001, 25_600_000);
        assert_eq!(chunks, vec![25_600_000, 25_600_000, 10_240_001]);
        assert_eq!(plan_chunks(20, 10), vec![10, 10]);
        assert!(plan_chunks(0, 10).is_empty());
    }

    #[test]
    fn test_chunk_percent() {
        assert_eq!(chunk_percent(0, 2), 67);
        assert_eq!(chunk_percent(1, 2), 95);
        assert_eq!(chunk_percent(0, 1), 95);
        assert_eq!(chunk_percent(0, 0), 95);
    }

    #[test]
    fn test_partial_last_chunk_advances_progress() {
        let chunks = plan_chunks(61_440_001, 25_600_000);
        let percents: Vec<u8> = (0..chunks.len())
            .map(|i| chunk_percent(i, chunks.len()))
            .collect();
        assert_eq!(percents, vec![58, 76, 95]);
        assert!(percents.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_write_round_trip() {
        let dir = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..24).collect();
        let (path, position) = source(dir.path(), &payload);
        let record = record(path, position, payload.len() as u64);
        let out_dir = dir.path().join("out");

        let outcome = small_chunks()
            .write_single_image(&record, &OutputConfig::new(&out_dir), &NullProgress)
            .unwrap();
        assert_eq!(outcome.file_name, "source_Series001.lif");
        assert_eq!(outcome.path, out_dir.join("source_Series001.lif"));
        assert!(outcome.alt_path.is_none());

        let index = ContainerIndex::open(&outcome.path).unwrap();
        assert_eq!(index.blocks().len(), 2);
        assert_eq!(index.blocks()[0].block_id, PLACEHOLDER_BLOCK_ID);
        assert_eq!(index.blocks()[0].memory_size, 0);
        let block = index.block("MemBlock_7").unwrap();
        assert_eq!(block.memory_size, 24);

        let bytes = fs::read(&outcome.path).unwrap();
        let start = block.position as usize;
        assert_eq!(&bytes[start..], payload.as_slice());

        let xml = index.xml();
        assert!(xml.contains(r#"<Element Name="source_Series001" Visibility="1">"#));
        assert!(xml.contains(r#"Name="source_Series001" UniqueID=""#));
        assert!(xml.ends_with("</LMSDataContainerHeader>\r\n"));
        assert_eq!(xml.matches('\n').count(), xml.matches("\r\n").count());
    }

    #[test]
    fn test_progress_sequence() {
        let dir = TempDir::new().unwrap();
        let (path, position) = source(dir.path(), &[1u8; 24]);
        let record = record(path, position, 24);
        let (progress, receiver) = ChannelProgress::new();

        small_chunks()
            .write_single_image(&record, &OutputConfig::new(dir.path().join("o")), &progress)
            .unwrap();

        let percents: Vec<u8> = receiver.try_iter().map(|e| e.percent).collect();
        // 24 bytes in chunks of 10: two full chunks and one partial
        assert_eq!(percents, vec![5, 10, 30, 40, 58, 76, 95, 100, 100]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_alt_copy_is_identical() {
        let dir = TempDir::new().unwrap();
        let (path, position) = source(dir.path(), &[9u8; 24]);
        let record = record(path, position, 24);
        let output = OutputConfig::new(dir.path().join("a")).with_alt(dir.path().join("b"));

        let outcome = small_chunks()
            .write_single_image(&record, &output, &NullProgress)
            .unwrap();
        let alt = outcome.alt_path.unwrap();
        assert_eq!(fs::read(&outcome.path).unwrap(), fs::read(alt).unwrap());
    }

    #[test]
    fn test_missing_descriptor_is_metadata_error() {
        let dir = TempDir::new().unwrap();
        let (path, position) = source(dir.path(), &[0u8; 4]);
        let mut record = record(path, position, 4);
        record.element = None;

        let err = SubContainerWriter::default()
            .write_single_image(&record, &OutputConfig::default(), &NullProgress)
            .unwrap_err();
        assert!(err.is_metadata_error());
    }

    #[test]
    fn test_short_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let (path, position) = source(dir.path(), &[0u8; 4]);
        let record = record(path, position, 4_000);

        let err = small_chunks()
            .write_single_image(&record, &OutputConfig::new(dir.path().join("o")), &NullProgress)
            .unwrap_err();
        assert!(err.is_io_error());
        assert!(matches!(err, MicroImgError::IoAt { len: 10, .. }));
    }

    #[test]
    fn test_cancellation_between_chunks() {
        let dir = TempDir::new().unwrap();
        let (path, position) = source(dir.path(), &[3u8; 24]);
        let record = record(path, position, 24);
        let progress = CallbackProgress::new(|_| {});
        progress.cancel();

        let err = small_chunks()
            .write_single_image(&record, &OutputConfig::new(dir.path().join("o")), &progress)
            .unwrap_err();
        assert!(matches!(err, MicroImgError::Cancelled));
    }

    #[test]
    fn test_empty_payload() {
        let dir = TempDir::new().unwrap();
        let (path, position) = source(dir.path(), &[]);
        let record = record(path, position, 0);
        let (progress, receiver) = ChannelProgress::new();

        let outcome = small_chunks()
            .write_single_image(&record, &OutputConfig::new(dir.path().join("o")), &progress)
            .unwrap();
        let index = ContainerIndex::open(outcome.path).unwrap();
        assert_eq!(index.block("MemBlock_7").unwrap().memory_size, 0);

        let events: Vec<_> = receiver.try_iter().collect();
        assert!(events.iter().any(|e| e.message == "No data to copy"));
    }
}
