//! Plane extraction from memory-mapped container files.
//!
//! Only the region of one plane (or one channel plane) is mapped at a time,
//! so the footprint follows the plane size and not the file size. Regions
//! need no alignment: `memmap2` rounds the mapping down to a page boundary
//! internally and exposes the exact byte range requested.

pub mod resample;

use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::address::{channel_offset, resolve, PlaneAddress};
use crate::error::{MicroImgError, Result};
use crate::metadata::{MetadataRecord, SampleType};

pub use resample::{resample_area, scaled_width};

/// Component order of interleaved samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Blue, green, red: the storage order of interleaved container planes.
    Bgr,
    /// Red, green, blue: display order.
    Rgb,
}

/// A decoded plane. Samples are widened to `u16`; `sample` keeps the domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    /// Columns.
    pub width: usize,
    /// Rows.
    pub height: usize,
    /// Samples per pixel (1 or 3).
    pub components: usize,
    /// Storage type the samples came from.
    pub sample: SampleType,
    /// Row-major samples, interleaved when `components > 1`.
    pub data: Vec<u16>,
}

impl Plane {
    /// Sample at `(x, y)`, component `c`.
    pub fn get(&self, x: usize, y: usize, c: usize) -> u16 {
        self.data[(y * self.width + x) * self.components + c]
    }

    /// Re-encode samples in their storage layout.
    pub fn to_bytes_le(&self) -> Vec<u8> {
        match self.sample {
            SampleType::U8 => self.data.iter().map(|&v| v as u8).collect(),
            SampleType::U16 => self.data.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }
}

/// Transient request for one plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneRequest {
    /// Z position (clamped).
    pub z: i64,
    /// Time point (clamped).
    pub t: i64,
    /// Tile (clamped).
    pub tile: i64,
    /// Channels to read; display order for RGB images.
    pub channel_mask: Option<Vec<bool>>,
    /// Output height in pixels; 0 keeps the stored height.
    pub output_height: u32,
}

impl PlaneRequest {
    /// Request all channels of a plane at the given output height.
    pub fn new(z: i64, t: i64, tile: i64, output_height: u32) -> Self {
        Self {
            z,
            t,
            tile,
            channel_mask: None,
            output_height,
        }
    }

    /// Restrict the request to a channel mask.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Self {
        self.channel_mask = Some(mask);
        self
    }

    /// Mask of length `channels`; all-true when absent or too short.
    pub fn effective_mask(&self, channels: usize) -> Vec<bool> {
        effective_mask(self.channel_mask.as_deref(), channels)
    }
}

/// Mask of length `channels`; all-true when absent or too short.
pub fn effective_mask(mask: Option<&[bool]>, channels: usize) -> Vec<bool> {
    match mask {
        Some(m) if m.len() >= channels => m[..channels].to_vec(),
        _ => vec![true; channels],
    }
}

/// Planes produced by one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedPlanes {
    /// One interleaved plane, tagged with its storage order.
    Interleaved {
        /// Interleaved samples.
        plane: Plane,
        /// Component order of `plane`.
        order: ChannelOrder,
    },
    /// One entry per channel; masked channels were not read.
    Planar {
        /// Output columns, known even when every channel is masked.
        width: usize,
        /// Output rows.
        height: usize,
        /// Per-channel planes in channel order.
        channels: Vec<Option<Plane>>,
    },
}

impl ExtractedPlanes {
    /// `(width, height)` of the extracted planes.
    pub fn size(&self) -> (usize, usize) {
        match self {
            ExtractedPlanes::Interleaved { plane, .. } => (plane.width, plane.height),
            ExtractedPlanes::Planar { width, height, .. } => (*width, *height),
        }
    }
}

/// Extract the plane(s) named by `request`, downsampled to its output height.
pub fn extract(metadata: &MetadataRecord, request: &PlaneRequest) -> Result<ExtractedPlanes> {
    let (xs, ys) = (metadata.dims.xs as usize, metadata.dims.ys as usize);
    if xs == 0 || ys == 0 {
        return Err(MicroImgError::UnavailableSource(format!(
            "degenerate geometry {}x{}",
            xs, ys
        )));
    }

    let address = resolve(metadata, request.z, request.t, request.tile)?;
    let file = open_source(&metadata.file_path)?;
    let file_len = file.metadata()?.len();

    let out_h = if request.output_height == 0 {
        ys
    } else {
        request.output_height as usize
    };
    let out_w = scaled_width(xs, ys, out_h);

    if metadata.isrgb {
        let plane = read_plane(&file, file_len, &address, address.offset, 3)?;
        let plane = downsample(plane, out_w, out_h);
        return Ok(ExtractedPlanes::Interleaved {
            plane,
            order: ChannelOrder::Bgr,
        });
    }

    let mask = request.effective_mask(metadata.channel_count());
    let mut planes = Vec::with_capacity(mask.len());
    for (c, &wanted) in mask.iter().enumerate() {
        if !wanted {
            planes.push(None);
            continue;
        }
        let offset = channel_offset(metadata, &address, c);
        let plane = read_plane(&file, file_len, &address, offset, 1)?;
        planes.push(Some(downsample(plane, out_w, out_h)));
    }
    Ok(ExtractedPlanes::Planar {
        width: out_w,
        height: out_h,
        channels: planes,
    })
}

/// Extract at stored resolution.
pub fn extract_full_plane(
    metadata: &MetadataRecord,
    z: i64,
    t: i64,
    tile: i64,
) -> Result<ExtractedPlanes> {
    extract(metadata, &PlaneRequest::new(z, t, tile, metadata.dims.ys))
}

fn open_source(path: &Path) -> Result<File> {
    File::open(path)
        .map_err(|e| MicroImgError::UnavailableSource(format!("{}: {}", path.display(), e)))
}

/// Map `len` bytes at `offset` read-only.
pub(crate) fn map_region(file: &File, file_len: u64, offset: u64, len: usize) -> Result<Mmap> {
    if len == 0 || offset.saturating_add(len as u64) > file_len {
        return Err(MicroImgError::UnavailableSource(format!(
            "region {}+{} exceeds file length {}",
            offset, len, file_len
        )));
    }
    // SAFETY: the mapping is read-only and the bounds were checked against
    // the file length; concurrent truncation of the source is not supported.
    let map = unsafe { MmapOptions::new().offset(offset).len(len).map(file) }
        .map_err(|e| MicroImgError::io_at("mapping plane", offset, len as u64, e))?;
    Ok(map)
}

/// Widen stored samples to `u16`.
pub(crate) fn decode_samples(bytes: &[u8], sample: SampleType) -> Vec<u16> {
    match sample {
        SampleType::U8 => bytes.iter().map(|&b| b as u16).collect(),
        SampleType::U16 => bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect(),
    }
}

fn read_plane(
    file: &File,
    file_len: u64,
    address: &PlaneAddress,
    offset: u64,
    components: usize,
) -> Result<Plane> {
    let (width, height) = (address.shape.width(), address.shape.height());
    let len = width * height * components * address.sample.bytes();
    let map = map_region(file, file_len, offset, len)?;
    log::debug!("Mapped {} bytes at offset {}", len, offset);

    Ok(Plane {
        width,
        height,
        components,
        sample: address.sample,
        data: decode_samples(&map, address.sample),
    })
}

fn downsample(plane: Plane, out_w: usize, out_h: usize) -> Plane {
    if plane.width == out_w && plane.height == out_h {
        return plane;
    }
    let data = resample_area(
        &plane.data,
        plane.width,
        plane.height,
        plane.components,
        out_w,
        out_h,
        plane.sample.max_value(),
    );
    Plane {
        width: out_w,
        height: out_h,
        data,
        ..plane
    }
}
