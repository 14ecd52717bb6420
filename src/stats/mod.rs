//! Intensity sampling: per-channel min/max estimates and display points.
//!
//! The centre plane along every axis is read at a row stride derived from
//! [`SamplerConfig::sample_fraction`]. Statistics are advisory, so
//! [`sample`] never fails: read errors degrade to the full sample range.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use serde::{Deserialize, Serialize};

use crate::address::{channel_offset, resolve};
use crate::config::{SampleStrategy, SamplerConfig};
use crate::error::{MicroImgError, Result};
use crate::extract::{decode_samples, map_region};
use crate::metadata::MetadataRecord;

/// Per-channel sampling result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Smallest sampled value per channel.
    pub channel_mins: Vec<u16>,
    /// Largest sampled value per channel.
    pub channel_maxs: Vec<u16>,
    /// Display black point per channel, in sample units.
    pub display_black: Vec<u16>,
    /// Display white point per channel, in sample units.
    pub display_white: Vec<u16>,
}

/// Sample `metadata`, falling back to `{0, container max}` on any failure.
pub fn sample(metadata: &MetadataRecord, config: &SamplerConfig) -> ChannelStats {
    match try_sample(metadata, config) {
        Ok(stats) => stats,
        Err(e) => {
            log::warn!(
                "Sampling {:?} failed, reporting full range: {}",
                metadata.name,
                e
            );
            let channels = metadata.channel_count();
            let max = metadata.container_max();
            ChannelStats {
                channel_mins: vec![0; channels],
                channel_maxs: vec![max; channels],
                ..display_points(metadata)
            }
        }
    }
}

/// Sample `metadata`, reporting read failures.
pub fn try_sample(metadata: &MetadataRecord, config: &SamplerConfig) -> Result<ChannelStats> {
    let (xs, ys) = (metadata.dims.xs as usize, metadata.dims.ys as usize);
    if xs == 0 || ys == 0 {
        return Err(MicroImgError::UnavailableSource(format!(
            "degenerate geometry {}x{}",
            xs, ys
        )));
    }

    let dims = &metadata.dims;
    let address = resolve(
        metadata,
        centre(dims.zs),
        centre(dims.ts),
        centre(dims.tiles),
    )?;
    let rows: Vec<usize> = (0..ys).step_by(config.row_stride()).collect();
    let reader = RowReader::open(metadata, rows, config.strategy)?;

    let extrema = if metadata.isrgb {
        let samples = reader.read(address.offset)?;
        component_extrema(&samples, 3)
    } else {
        let mut extrema = Vec::with_capacity(metadata.channel_count());
        for c in 0..metadata.channel_count() {
            let samples = reader.read(channel_offset(metadata, &address, c))?;
            extrema.extend(component_extrema(&samples, 1));
        }
        extrema
    };

    let (channel_mins, channel_maxs) = extrema.into_iter().unzip();
    Ok(ChannelStats {
        channel_mins,
        channel_maxs,
        ..display_points(metadata)
    })
}

fn centre(dim: u32) -> i64 {
    if dim > 1 {
        (dim / 2) as i64
    } else {
        0
    }
}

fn display_points(metadata: &MetadataRecord) -> ChannelStats {
    let channels = metadata.channel_count();
    let max = metadata.container_max();
    ChannelStats {
        display_black: scale_display_values(metadata.display.black.as_deref(), channels, max, 0),
        display_white: scale_display_values(metadata.display.white.as_deref(), channels, max, max),
        ..Default::default()
    }
}

/// Scale declared display points to sample units.
///
/// Values in `[0, 1]` are normalized and multiplied by `max`; larger values
/// are clamped to `max` and negative ones to 0. Missing or non-finite
/// entries become `default`. The list is padded with its last entry or truncated to
/// `channels`.
pub fn scale_display_values(
    values: Option<&[f64]>,
    channels: usize,
    max: u16,
    default: u16,
) -> Vec<u16> {
    let values = match values {
        Some(v) if !v.is_empty() => v,
        _ => return vec![default; channels],
    };
    let last = values[values.len() - 1];
    (0..channels)
        .map(|c| {
            let v = values.get(c).copied().unwrap_or(last);
            if !v.is_finite() {
                default
            } else if v < 0.0 {
                0
            } else if v > 1.0 {
                v.min(max as f64).round() as u16
            } else {
                (v * max as f64).round() as u16
            }
        })
        .collect()
}

/// `(min, max)` of each interleaved component.
fn component_extrema(samples: &[u16], components: usize) -> Vec<(u16, u16)> {
    let mut extrema = vec![(u16::MAX, 0u16); components];
    for pixel in samples.chunks_exact(components) {
        for (e, &v) in extrema.iter_mut().zip(pixel) {
            e.0 = e.0.min(v);
            e.1 = e.1.max(v);
        }
    }
    if samples.is_empty() {
        extrema.iter_mut().for_each(|e| *e = (0, 0));
    }
    extrema
}

/// Reads the retained rows of one plane with the configured strategy.
struct RowReader<'a> {
    metadata: &'a MetadataRecord,
    file: File,
    file_len: u64,
    rows: Vec<usize>,
    row_bytes: usize,
    strategy: SampleStrategy,
}

impl<'a> RowReader<'a> {
    fn open(metadata: &'a MetadataRecord, rows: Vec<usize>, strategy: SampleStrategy) -> Result<Self> {
        let file = File::open(&metadata.file_path).map_err(|e| {
            MicroImgError::UnavailableSource(format!("{}: {}", metadata.file_path.display(), e))
        })?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            metadata,
            file,
            file_len,
            rows,
            row_bytes: metadata.row_bytes(),
            strategy,
        })
    }

    /// Concatenated samples of every retained row of the plane at `offset`.
    fn read(&self, offset: u64) -> Result<Vec<u16>> {
        let mut bytes = Vec::with_capacity(self.rows.len() * self.row_bytes);
        match self.strategy {
            SampleStrategy::Mapped => {
                let last = self.rows.last().copied().unwrap_or(0);
                let len = (last + 1) * self.row_bytes;
                let map = map_region(&self.file, self.file_len, offset, len)?;
                for &y in &self.rows {
                    let start = y * self.row_bytes;
                    bytes.extend_from_slice(&map[start..start + self.row_bytes]);
                }
            }
            SampleStrategy::Seek => {
                let mut file = &self.file;
                let mut row = vec![0u8; self.row_bytes];
                for &y in &self.rows {
                    let at = offset.saturating_add((y * self.row_bytes) as u64);
                    file.seek(SeekFrom::Start(at))
                        .and_then(|_| file.read_exact(&mut row))
                        .map_err(|e| {
                            MicroImgError::io_at("reading sample row", at, self.row_bytes as u64, e)
                        })?;
                    bytes.extend_from_slice(&row);
                }
            }
        }
        Ok(decode_samples(&bytes, self.metadata.sample_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Dims, DisplayRange, FileType, Strides};
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    fn record(path: &Path, xs: u32, ys: u32, zs: u32, channels: u32, bits: u32) -> MetadataRecord {
        let bytes = if bits > 8 { 2 } else { 1 };
        let plane = (xs * ys * bytes) as u64;
        MetadataRecord {
            filetype: FileType::SingleImage,
            file_path: path.to_path_buf(),
            base_position: 0,
            dims: Dims {
                xs,
                ys,
                zs,
                channels,
                ..Dims::default()
            },
            isrgb: false,
            channel_bits: vec![bits; channels as usize],
            strides: Strides {
                channel: (0..channels as u64).map(|c| c * plane).collect(),
                z: plane * channels as u64,
                t: 0,
                tile: 0,
            },
            display: DisplayRange::default(),
            lut_names: Vec::new(),
            overlap_is_negative: false,
            name: "img".into(),
            uuid: String::new(),
            element: None,
        }
    }

    fn write_file(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    fn config(strategy: SampleStrategy) -> SamplerConfig {
        SamplerConfig {
            sample_fraction: 0.25,
            strategy,
        }
    }

    #[test]
    fn test_constant_plane() {
        let file = write_file(&[42u8; 64]);
        let meta = record(file.path(), 8, 8, 1, 1, 8);

        let stats = try_sample(&meta, &SamplerConfig::default()).unwrap();
        assert_eq!(stats.channel_mins, vec![42]);
        assert_eq!(stats.channel_maxs, vec![42]);
        assert_eq!(stats.display_black, vec![0]);
        assert_eq!(stats.display_white, vec![255]);
    }

    #[test]
    fn test_mapped_and_seek_agree() {
        let mut state = 0x2545_F491u32;
        let mut bytes = Vec::new();
        for _ in 0..(13 * 11 * 2 * 2) {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            bytes.push((state >> 16) as u8);
        }
        let file = write_file(&bytes);
        let meta = record(file.path(), 13, 11, 1, 2, 16);

        let mapped = try_sample(&meta, &config(SampleStrategy::Mapped)).unwrap();
        let seek = try_sample(&meta, &config(SampleStrategy::Seek)).unwrap();
        assert_eq!(mapped, seek);
        assert_eq!(mapped.channel_mins.len(), 2);
    }

    #[test]
    fn test_centre_plane_is_sampled() {
        // planes z=0,1,2 filled with 1, 50, 9
        let mut bytes = vec![1u8; 16];
        bytes.extend([50u8; 16]);
        bytes.extend([9u8; 16]);
        let file = write_file(&bytes);
        let meta = record(file.path(), 4, 4, 3, 1, 8);

        let stats = try_sample(&meta, &config(SampleStrategy::Seek)).unwrap();
        assert_eq!(stats.channel_mins, vec![50]);
        assert_eq!(stats.channel_maxs, vec![50]);
    }

    #[test]
    fn test_only_strided_rows_are_read() {
        // rows 0 and 4 hold 5; every other row holds 200
        let mut bytes = Vec::new();
        for y in 0..8 {
            bytes.extend([if y % 4 == 0 { 5u8 } else { 200 }; 4]);
        }
        let file = write_file(&bytes);
        let meta = record(file.path(), 4, 8, 1, 1, 8);

        let stats = try_sample(&meta, &config(SampleStrategy::Mapped)).unwrap();
        assert_eq!(stats.channel_maxs, vec![5]);
    }

    #[test]
    fn test_rgb_components_are_independent() {
        let mut bytes = Vec::new();
        for i in 0..4u8 {
            bytes.extend([i, 100 + i, 200]);
        }
        let file = write_file(&bytes);
        let mut meta = record(file.path(), 2, 2, 1, 3, 8);
        meta.isrgb = true;

        let stats = try_sample(
            &meta,
            &SamplerConfig {
                sample_fraction: 1.0,
                strategy: SampleStrategy::Mapped,
            },
        )
        .unwrap();
        assert_eq!(stats.channel_mins, vec![0, 100, 200]);
        assert_eq!(stats.channel_maxs, vec![3, 103, 200]);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let mut meta = record(Path::new("/nonexistent/img.lof"), 4, 4, 1, 2, 12);
        meta.display.white = Some(vec![0.5]);

        let stats = sample(&meta, &SamplerConfig::default());
        assert_eq!(stats.channel_mins, vec![0, 0]);
        assert_eq!(stats.channel_maxs, vec![65535, 65535]);
        assert_eq!(stats.display_black, vec![0, 0]);
        assert_eq!(stats.display_white, vec![32768, 32768]);
    }

    #[test]
    fn test_short_file_falls_back() {
        let file = write_file(&[7u8; 10]);
        let meta = record(file.path(), 8, 8, 1, 1, 8);
        let stats = sample(&meta, &config(SampleStrategy::Seek));
        assert_eq!(stats.channel_maxs, vec![255]);
    }

    #[test]
    fn test_scale_display_values() {
        assert_eq!(scale_display_values(None, 2, 255, 0), vec![0, 0]);
        assert_eq!(scale_display_values(Some(&[]), 2, 255, 255), vec![255, 255]);
        assert_eq!(scale_display_values(Some(&[0.5]), 3, 255, 0), vec![128, 128, 128]);
        assert_eq!(scale_display_values(Some(&[1.0, 300.0, 4.0]), 2, 255, 0), vec![255, 255]);
        assert_eq!(scale_display_values(Some(&[f64::NAN, -2.0]), 2, 255, 255), vec![255, 0]);
        assert_eq!(scale_display_values(Some(&[-0.2]), 1, 255, 255), vec![0]);
        assert_eq!(scale_display_values(Some(&[1000.0]), 1, 4095, 0), vec![1000]);
    }
}
