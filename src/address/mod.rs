//! Plane addressing: map `(z, t, tile)` indices to absolute byte offsets.

use crate::error::{MicroImgError, Result};
use crate::metadata::{MetadataRecord, SampleType};

/// Stored shape of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneShape {
    /// `(ys, xs)` single-component samples.
    Planar {
        /// Rows.
        height: usize,
        /// Columns.
        width: usize,
    },
    /// `(ys, xs, 3)` interleaved samples.
    Interleaved {
        /// Rows.
        height: usize,
        /// Columns.
        width: usize,
    },
}

impl PlaneShape {
    /// Rows of the plane.
    pub fn height(&self) -> usize {
        match *self {
            PlaneShape::Planar { height, .. } | PlaneShape::Interleaved { height, .. } => height,
        }
    }

    /// Columns of the plane.
    pub fn width(&self) -> usize {
        match *self {
            PlaneShape::Planar { width, .. } | PlaneShape::Interleaved { width, .. } => width,
        }
    }

    /// Samples per pixel.
    pub fn components(&self) -> usize {
        match self {
            PlaneShape::Planar { .. } => 1,
            PlaneShape::Interleaved { .. } => 3,
        }
    }

    /// Samples in the whole plane.
    pub fn sample_count(&self) -> usize {
        self.height() * self.width() * self.components()
    }
}

/// Clamped plane indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneIndex {
    /// Z position.
    pub z: u32,
    /// Time point.
    pub t: u32,
    /// Tile.
    pub tile: u32,
}

/// Resolved location of one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneAddress {
    /// Indices after clamping.
    pub index: PlaneIndex,
    /// Absolute offset of the plane (channel 0 for planar layouts).
    pub offset: u64,
    /// Stored shape.
    pub shape: PlaneShape,
    /// Sample type used for every channel of the file.
    pub sample: SampleType,
}

impl PlaneAddress {
    /// Bytes covered by one stored plane.
    pub fn byte_len(&self) -> u64 {
        (self.shape.sample_count() * self.sample.bytes()) as u64
    }
}

/// Clamp `index` into `[0, dim - 1]`.
pub fn clamp_index(index: i64, dim: u32) -> u32 {
    let last = dim.max(1) as i64 - 1;
    index.clamp(0, last) as u32
}

/// Compute the byte offset of a plane without touching the file system.
///
/// Out-of-range indices are clamped independently per axis.
pub fn plane_offset(metadata: &MetadataRecord, z: i64, t: i64, tile: i64) -> (PlaneIndex, u64) {
    let dims = &metadata.dims;
    let index = PlaneIndex {
        z: clamp_index(z, dims.zs),
        t: clamp_index(t, dims.ts),
        tile: clamp_index(tile, dims.tiles),
    };
    let strides = &metadata.strides;
    // strides come from untrusted metadata; an overflowing offset lands past
    // the end of the file and is reported as unavailable when mapped
    let offset = metadata
        .base_position
        .saturating_add((index.t as u64).saturating_mul(strides.t))
        .saturating_add((index.tile as u64).saturating_mul(strides.tile))
        .saturating_add((index.z as u64).saturating_mul(strides.z));
    (index, offset)
}

/// Resolve `(z, t, tile)` into an address.
///
/// The only failure is a missing pixel file.
pub fn resolve(metadata: &MetadataRecord, z: i64, t: i64, tile: i64) -> Result<PlaneAddress> {
    if !metadata.file_path.exists() {
        return Err(MicroImgError::UnavailableSource(format!(
            "file not found: {}",
            metadata.file_path.display()
        )));
    }

    let (index, offset) = plane_offset(metadata, z, t, tile);
    let height = metadata.dims.ys as usize;
    let width = metadata.dims.xs as usize;
    let shape = if metadata.isrgb {
        PlaneShape::Interleaved { height, width }
    } else {
        PlaneShape::Planar { height, width }
    };

    Ok(PlaneAddress {
        index,
        offset,
        shape,
        sample: metadata.sample_type(),
    })
}

/// Offset of channel `c` of a planar plane.
pub fn channel_offset(metadata: &MetadataRecord, address: &PlaneAddress, c: usize) -> u64 {
    if metadata.isrgb {
        address.offset
    } else {
        address.offset.saturating_add(metadata.strides.channel(c))
    }
}
