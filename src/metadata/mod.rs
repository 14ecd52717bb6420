//! Canonical metadata record for one image inside a microscopy container.
//!
//! The external XML parser produces a loosely typed JSON document. It is
//! deserialized once into [`RawMetadata`] and validated into a
//! [`MetadataRecord`], which is the only type the read and write paths see.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MicroImgError, Result};

/// Header size of a SingleImage (`.lof`) file; pixels start right after it.
pub const SINGLE_IMAGE_HEADER_LEN: u64 = 62;

/// Bit depths kept as declared when selecting the storage type.
const STANDARD_BIT_DEPTHS: [u32; 6] = [8, 12, 14, 15, 16, 32];

/// Container family of the file holding an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Composite `.lif` file with an embedded XML tree and memory blocks.
    Container,
    /// `.xlef` folder index referencing SingleImage files.
    FolderIndex,
    /// `.lof` file with one raw image payload.
    SingleImage,
}

impl FileType {
    /// Map a file extension (with or without leading dot) to a file type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "lif" => Some(FileType::Container),
            "xlef" => Some(FileType::FolderIndex),
            "lof" => Some(FileType::SingleImage),
            _ => None,
        }
    }

    /// Canonical file extension including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Container => ".lif",
            FileType::FolderIndex => ".xlef",
            FileType::SingleImage => ".lof",
        }
    }
}

/// Sample storage type of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleType {
    /// 1-byte unsigned samples.
    U8,
    /// 2-byte little-endian unsigned samples.
    U16,
}

impl SampleType {
    /// Storage type for a declared bit depth.
    pub fn from_bits(bits: u32) -> Self {
        if effective_bit_depth(bits) <= 8 {
            SampleType::U8
        } else {
            SampleType::U16
        }
    }

    /// Bytes per stored sample.
    pub fn bytes(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
        }
    }

    /// Largest representable sample value.
    pub fn max_value(&self) -> u16 {
        match self {
            SampleType::U8 => u8::MAX as u16,
            SampleType::U16 => u16::MAX,
        }
    }
}

/// Clamp a declared bit depth to one the storage selection understands.
///
/// Standard depths pass through. Anything else becomes 8 when `1..=8`,
/// otherwise 16. Unverified for packed formats such as 12-bit packed.
pub fn effective_bit_depth(bits: u32) -> u32 {
    if STANDARD_BIT_DEPTHS.contains(&bits) {
        bits
    } else if bits > 0 && bits <= 8 {
        8
    } else {
        16
    }
}

/// Image extent along every logical axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dims {
    /// Width in pixels.
    pub xs: u32,
    /// Height in pixels.
    pub ys: u32,
    /// Number of Z positions.
    pub zs: u32,
    /// Number of time points.
    pub ts: u32,
    /// Number of tiles.
    pub tiles: u32,
    /// Number of channels.
    pub channels: u32,
}

impl Default for Dims {
    fn default() -> Self {
        Self {
            xs: 1,
            ys: 1,
            zs: 1,
            ts: 1,
            tiles: 1,
            channels: 1,
        }
    }
}

/// Byte increments to advance one index step along each axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strides {
    /// Per-channel offsets, not assumed uniform.
    pub channel: Vec<u64>,
    /// Z increment.
    pub z: u64,
    /// Time increment.
    pub t: u64,
    /// Tile increment.
    pub tile: u64,
}

impl Strides {
    /// Offset of channel `c`; channels without a declared stride sit at 0.
    pub fn channel(&self, c: usize) -> u64 {
        self.channel.get(c).copied().unwrap_or(0)
    }

    /// Number of the first `channels` channels without a declared stride.
    pub fn undeclared_channels(&self, channels: usize) -> usize {
        channels.saturating_sub(self.channel.len())
    }
}

/// Per-channel display black/white points as declared by the acquisition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayRange {
    /// Black points, normalized `[0, 1]` or already scaled.
    pub black: Option<Vec<f64>>,
    /// White points, normalized `[0, 1]` or already scaled.
    pub white: Option<Vec<f64>>,
}

/// Embedded element description needed to rebuild a single-image container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Element name inside the source container.
    pub name: String,
    /// Raw XML fragment of the `<Element>` describing the image.
    pub xml_fragment: String,
    /// Memory block identifier of the pixel payload.
    pub block_id: String,
    /// Payload length in bytes.
    pub memory_size: u64,
    /// Absolute payload offset in the source file.
    pub position: u64,
    /// Name used for the new container and its renamed element.
    pub save_name: String,
}

/// Validated description of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Container family.
    pub filetype: FileType,
    /// File holding the raw pixel bytes.
    pub file_path: PathBuf,
    /// Offset of the first pixel of plane (0,0,0,0).
    pub base_position: u64,
    /// Geometry.
    pub dims: Dims,
    /// Interleaved 3-component samples.
    pub isrgb: bool,
    /// Declared bit depth per channel.
    pub channel_bits: Vec<u32>,
    /// Byte strides.
    pub strides: Strides,
    /// Display black/white points.
    pub display: DisplayRange,
    /// Colour identifiers per channel.
    pub lut_names: Vec<String>,
    /// Tiles were acquired with negative overlap.
    pub overlap_is_negative: bool,
    /// Image name.
    pub name: String,
    /// Image unique identifier.
    pub uuid: String,
    /// Element descriptor for the sub-container writer.
    pub element: Option<ElementDescriptor>,
}

impl MetadataRecord {
    /// Parse and validate a JSON document from the metadata parser.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawMetadata = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Read and validate a JSON document from disk.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Validate raw parser output, applying every defaulting rule.
    pub fn from_raw(raw: RawMetadata) -> Result<Self> {
        let filetype_text = raw
            .filetype
            .as_deref()
            .ok_or_else(|| MicroImgError::UnavailableSource("missing filetype".into()))?;
        let filetype = FileType::from_extension(filetype_text).ok_or_else(|| {
            MicroImgError::UnavailableSource(format!("unrecognized filetype {}", filetype_text))
        })?;

        let (file_path, base_position) = match filetype {
            FileType::Container => {
                let path = raw.lif_file.clone().or_else(|| raw.lof_file_path.clone());
                (path, value_u64(raw.position.as_ref()).unwrap_or(0))
            }
            FileType::FolderIndex | FileType::SingleImage => {
                (raw.lof_file_path.clone(), SINGLE_IMAGE_HEADER_LEN)
            }
        };
        let file_path = file_path.ok_or_else(|| {
            MicroImgError::MalformedMetadata("record names no pixel data file".into())
        })?;

        let isrgb = value_bool(raw.isrgb.as_ref()).unwrap_or(false);
        let positive = |v: &Option<Value>| value_u64(v.as_ref()).filter(|&n| n >= 1).unwrap_or(1) as u32;
        // Zero or negative extents stay zero so the extractor reports degenerate geometry.
        let extent = |v: &Option<Value>| match v.as_ref().and_then(value_f64) {
            Some(f) if f < 1.0 => 0,
            Some(f) => f.round() as u32,
            None => 1,
        };
        let dims = Dims {
            xs: extent(&raw.xs),
            ys: extent(&raw.ys),
            zs: positive(&raw.zs),
            ts: positive(&raw.ts),
            tiles: positive(&raw.tiles),
            channels: if isrgb { 3 } else { positive(&raw.channels) },
        };

        let channel_count = dims.channels as usize;
        let channel_bits = resolve_channel_bits(raw.channel_resolution.as_ref(), channel_count, isrgb);

        let strides = Strides {
            channel: value_list(raw.channel_bytes_inc.as_ref())
                .into_iter()
                .map(|v| v.and_then(|f| non_negative(f)).unwrap_or(0))
                .collect(),
            z: value_u64(raw.z_bytes_inc.as_ref()).unwrap_or(0),
            t: value_u64(raw.t_bytes_inc.as_ref()).unwrap_or(0),
            tile: value_u64(raw.tiles_bytes_inc.as_ref()).unwrap_or(0),
        };
        let undeclared = strides.undeclared_channels(channel_count);
        if !isrgb && undeclared > 0 {
            log::debug!(
                "{} of {} channels of {:?} declare no byte offset and read from offset 0",
                undeclared,
                channel_count,
                raw.name.as_deref().unwrap_or_default()
            );
        }

        let display = DisplayRange {
            black: display_list(raw.black_value.as_ref()),
            white: display_list(raw.white_value.as_ref()),
        };

        let lut_names = match raw.lut_name.as_ref() {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().unwrap_or_default().to_string())
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        };

        let name = raw.name.clone().unwrap_or_default();
        let element = element_descriptor(&raw, &name);
        if element.is_none() && raw.xml_element.is_some() {
            log::debug!("Element descriptor for {:?} is incomplete", name);
        }

        Ok(Self {
            filetype,
            file_path,
            base_position,
            dims,
            isrgb,
            channel_bits,
            strides,
            display,
            lut_names,
            overlap_is_negative: value_bool(raw.overlap_is_negative.as_ref()).unwrap_or(false),
            name,
            uuid: raw.uuid.unwrap_or_default(),
            element,
        })
    }

    /// Number of channels actually stored (3 for interleaved RGB).
    pub fn channel_count(&self) -> usize {
        if self.isrgb {
            3
        } else {
            self.dims.channels.max(1) as usize
        }
    }

    /// Clamped bit depth of channel `c`.
    pub fn effective_bits(&self, c: usize) -> u32 {
        let declared = self
            .channel_bits
            .get(c)
            .or_else(|| self.channel_bits.last())
            .copied()
            .unwrap_or(if self.isrgb { 8 } else { 16 });
        effective_bit_depth(declared)
    }

    /// Storage type for the whole file, driven by channel 0.
    pub fn sample_type(&self) -> SampleType {
        SampleType::from_bits(self.effective_bits(0))
    }

    /// Largest sample value of the storage type.
    pub fn container_max(&self) -> u16 {
        self.sample_type().max_value()
    }

    /// Bytes per pixel row of one stored plane.
    pub fn row_bytes(&self) -> usize {
        let components = if self.isrgb { 3 } else { 1 };
        self.dims.xs as usize * components * self.sample_type().bytes()
    }

    /// Bytes of one stored plane.
    pub fn plane_bytes(&self) -> usize {
        self.row_bytes() * self.dims.ys as usize
    }
}

/// Loosely typed parser output, one field per key of the metadata JSON.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMetadata {
    /// File extension of the source (".lif", ".xlef", ".lof").
    pub filetype: Option<String>,
    /// Container file holding the payload.
    #[serde(rename = "LIFFile")]
    pub lif_file: Option<PathBuf>,
    /// SingleImage file holding the payload.
    #[serde(rename = "LOFFilePath")]
    pub lof_file_path: Option<PathBuf>,
    /// Payload offset in a Container file.
    #[serde(rename = "Position")]
    pub position: Option<Value>,
    #[allow(missing_docs)]
    pub xs: Option<Value>,
    #[allow(missing_docs)]
    pub ys: Option<Value>,
    #[allow(missing_docs)]
    pub zs: Option<Value>,
    #[allow(missing_docs)]
    pub ts: Option<Value>,
    #[allow(missing_docs)]
    pub tiles: Option<Value>,
    #[allow(missing_docs)]
    pub channels: Option<Value>,
    /// Interleaved RGB flag, boolean or string.
    pub isrgb: Option<Value>,
    /// Bit depth, scalar or per channel.
    #[serde(rename = "channelResolution")]
    pub channel_resolution: Option<Value>,
    /// Per-channel byte offsets.
    #[serde(rename = "channelbytesinc")]
    pub channel_bytes_inc: Option<Value>,
    #[allow(missing_docs)]
    #[serde(rename = "zbytesinc")]
    pub z_bytes_inc: Option<Value>,
    #[allow(missing_docs)]
    #[serde(rename = "tbytesinc")]
    pub t_bytes_inc: Option<Value>,
    #[allow(missing_docs)]
    #[serde(rename = "tilesbytesinc")]
    pub tiles_bytes_inc: Option<Value>,
    /// Display black points.
    #[serde(rename = "blackvalue")]
    pub black_value: Option<Value>,
    /// Display white points.
    #[serde(rename = "whitevalue")]
    pub white_value: Option<Value>,
    /// Per-channel colour names.
    #[serde(rename = "lutname")]
    pub lut_name: Option<Value>,
    /// Overlap-sign flag.
    #[serde(rename = "OverlapIsNegative")]
    pub overlap_is_negative: Option<Value>,
    #[allow(missing_docs)]
    pub name: Option<String>,
    #[allow(missing_docs)]
    pub uuid: Option<String>,
    /// Target name for extracted containers.
    pub save_child_name: Option<String>,
    /// Memory block identifier.
    #[serde(rename = "BlockID")]
    pub block_id: Option<String>,
    /// Payload length.
    #[serde(rename = "MemorySize")]
    pub memory_size: Option<Value>,
    /// Raw `<Element>` XML.
    #[serde(rename = "xmlElement")]
    pub xml_element: Option<String>,
}

fn element_descriptor(raw: &RawMetadata, name: &str) -> Option<ElementDescriptor> {
    if name.is_empty() {
        return None;
    }
    Some(ElementDescriptor {
        name: name.to_string(),
        xml_fragment: raw.xml_element.clone()?,
        block_id: raw.block_id.clone()?,
        memory_size: value_u64(raw.memory_size.as_ref())?,
        position: value_u64(raw.position.as_ref())?,
        save_name: raw
            .save_child_name
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| name.to_string()),
    })
}

fn resolve_channel_bits(value: Option<&Value>, channels: usize, isrgb: bool) -> Vec<u32> {
    let fallback = if isrgb { 8 } else { 16 };
    match value {
        Some(Value::Array(items)) if !items.is_empty() => (0..channels)
            .map(|c| {
                items
                    .get(c)
                    .and_then(value_f64)
                    .and_then(non_negative)
                    .map(|b| b as u32)
                    .unwrap_or(fallback)
            })
            .collect(),
        Some(v) => match value_f64(v).and_then(non_negative) {
            Some(b) => vec![b as u32; channels],
            None => vec![fallback; channels],
        },
        None => vec![fallback; channels],
    }
}

fn display_list(value: Option<&Value>) -> Option<Vec<f64>> {
    match value {
        // Unparsable entries stay NaN so consumers can apply their own default.
        Some(Value::Array(items)) => Some(items.iter().map(|v| value_f64(v).unwrap_or(f64::NAN)).collect()),
        Some(v) => value_f64(v).map(|f| vec![f]),
        None => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn non_negative(value: f64) -> Option<u64> {
    if value >= 0.0 {
        Some(value.round() as u64)
    } else {
        None
    }
}

fn value_u64(value: Option<&Value>) -> Option<u64> {
    value.and_then(value_f64).and_then(non_negative)
}

fn value_list(value: Option<&Value>) -> Vec<Option<f64>> {
    match value {
        Some(Value::Array(items)) => items.iter().map(value_f64).collect(),
        _ => Vec::new(),
    }
}

fn value_bool(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}
