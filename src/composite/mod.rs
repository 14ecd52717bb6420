//! Channel compositing: grayscale planes or an interleaved plane to display RGB.
//!
//! This is the only place where the blue-green-red storage order of
//! interleaved planes is turned into red-green-blue display order.

use crate::extract::{effective_mask, extract, ChannelOrder, ExtractedPlanes, Plane, PlaneRequest};
use crate::metadata::{MetadataRecord, SampleType};

/// Display colours used when a channel declares no colour, indexed by channel.
pub const DEFAULT_CYCLE: [[u8; 3]; 7] = [
    [0, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 255, 0],
    [255, 0, 0],
    [0, 0, 255],
    [255, 255, 255],
];

/// Resolve a channel's declared colour name to an RGB triple.
pub trait ColorLookup: Send + Sync {
    /// `None` when the name is not recognised.
    fn lookup(&self, name: &str) -> Option<[u8; 3]>;
}

/// Contrast-stretch pass applied to every composited image.
pub trait ContrastStretch: Send + Sync {
    /// Stretch `image` in place, staying inside its sample domain.
    fn apply(&self, image: &mut RgbImage);
}

/// Basic LUT names understood by the acquisition software.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamedColors;

impl ColorLookup for NamedColors {
    fn lookup(&self, name: &str) -> Option<[u8; 3]> {
        match name.trim().to_ascii_lowercase().as_str() {
            "red" => Some([255, 0, 0]),
            "green" => Some([0, 255, 0]),
            "blue" => Some([0, 0, 255]),
            "cyan" => Some([0, 255, 255]),
            "magenta" => Some([255, 0, 255]),
            "yellow" => Some([255, 255, 0]),
            "gray" | "grey" | "white" => Some([255, 255, 255]),
            _ => None,
        }
    }
}

/// Leaves the image untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStretch;

impl ContrastStretch for NoStretch {
    fn apply(&self, _image: &mut RgbImage) {}
}

/// Linear stretch of each output component from its own min..max to the full range.
///
/// Components with a flat histogram are left as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxStretch;

impl ContrastStretch for MinMaxStretch {
    fn apply(&self, image: &mut RgbImage) {
        let max = image.sample.max_value() as f64;
        for k in 0..3 {
            let component = image.data.iter().skip(k).step_by(3);
            let (lo, hi) = component.fold((u16::MAX, 0u16), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            if hi <= lo {
                continue;
            }
            let scale = max / (hi - lo) as f64;
            for v in image.data.iter_mut().skip(k).step_by(3) {
                *v = ((*v - lo) as f64 * scale).round().min(max) as u16;
            }
        }
    }
}

/// Composited display image, interleaved RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    /// Columns.
    pub width: usize,
    /// Rows.
    pub height: usize,
    /// Sample domain of `data`.
    pub sample: SampleType,
    /// `height * width * 3` samples in R, G, B order.
    pub data: Vec<u16>,
}

impl RgbImage {
    /// All-black image.
    pub fn zeros(width: usize, height: usize, sample: SampleType) -> Self {
        Self {
            width,
            height,
            sample,
            data: vec![0; width * height * 3],
        }
    }

    /// Pixel `(x, y)` as `[r, g, b]`.
    pub fn pixel(&self, x: usize, y: usize) -> [u16; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Convert to an 8-bit buffer for PNG export; 16-bit samples keep their high byte.
    pub fn to_rgb8(&self) -> image::RgbImage {
        let shift = match self.sample {
            SampleType::U8 => 0,
            SampleType::U16 => 8,
        };
        image::RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let [r, g, b] = self.pixel(x as usize, y as usize);
            image::Rgb([(r >> shift) as u8, (g >> shift) as u8, (b >> shift) as u8])
        })
    }
}

/// Combine extracted planes into one display image.
///
/// `mask` is in display order (R, G, B for interleaved images) and is
/// defaulted to all-true when absent or too short. Channels are accumulated
/// in ascending index order so the result is reproducible bit for bit.
pub fn composite(
    planes: &ExtractedPlanes,
    metadata: &MetadataRecord,
    mask: Option<&[bool]>,
    colors: &dyn ColorLookup,
    stretch: &dyn ContrastStretch,
) -> RgbImage {
    let mut image = match planes {
        ExtractedPlanes::Interleaved { plane, order } => composite_interleaved(plane, *order, mask),
        ExtractedPlanes::Planar {
            width,
            height,
            channels,
        } => composite_planar(*width, *height, channels, metadata, mask, colors),
    };
    stretch.apply(&mut image);
    image
}

fn composite_interleaved(plane: &Plane, order: ChannelOrder, mask: Option<&[bool]>) -> RgbImage {
    let mask = effective_mask(mask, 3);
    // display component k reads storage component source[k]
    let source = match order {
        ChannelOrder::Bgr => [2, 1, 0],
        ChannelOrder::Rgb => [0, 1, 2],
    };
    let max = plane.sample.max_value();

    let mut data = Vec::with_capacity(plane.width * plane.height * 3);
    for pixel in plane.data.chunks_exact(plane.components.max(1)) {
        for k in 0..3 {
            let value = pixel.get(source[k]).copied().unwrap_or(0);
            data.push(if mask[k] { value.min(max) } else { 0 });
        }
    }

    RgbImage {
        width: plane.width,
        height: plane.height,
        sample: plane.sample,
        data,
    }
}

fn composite_planar(
    width: usize,
    height: usize,
    channels: &[Option<Plane>],
    metadata: &MetadataRecord,
    mask: Option<&[bool]>,
    colors: &dyn ColorLookup,
) -> RgbImage {
    let mask = effective_mask(mask, channels.len());
    let sample = channels
        .iter()
        .flatten()
        .next()
        .map(|p| p.sample)
        .unwrap_or_else(|| metadata.sample_type());

    let mut acc = vec![0.0f32; width * height * 3];
    for (c, plane) in channels.iter().enumerate() {
        let Some(plane) = plane.as_ref().filter(|_| mask[c]) else {
            continue;
        };
        let color = channel_color(metadata, c, colors);
        let weights = color.map(|v| v as f32 / 255.0);
        for (px, &v) in acc.chunks_exact_mut(3).zip(&plane.data) {
            let v = v as f32;
            px[0] += v * weights[0];
            px[1] += v * weights[1];
            px[2] += v * weights[2];
        }
    }

    let max = sample.max_value() as f32;
    RgbImage {
        width,
        height,
        sample,
        data: acc.into_iter().map(|v| v.clamp(0.0, max) as u16).collect(),
    }
}

/// Display colour of channel `c`: declared LUT name, else the default cycle.
pub fn channel_color(metadata: &MetadataRecord, c: usize, colors: &dyn ColorLookup) -> [u8; 3] {
    metadata
        .lut_names
        .get(c)
        .and_then(|name| colors.lookup(name))
        .unwrap_or(DEFAULT_CYCLE[c % DEFAULT_CYCLE.len()])
}

/// Extract and composite a preview; `None` when the source is unavailable.
pub fn render_preview(
    metadata: &MetadataRecord,
    request: &PlaneRequest,
    colors: &dyn ColorLookup,
    stretch: &dyn ContrastStretch,
) -> Option<RgbImage> {
    match extract(metadata, request) {
        Ok(planes) => Some(composite(
            &planes,
            metadata,
            request.channel_mask.as_deref(),
            colors,
            stretch,
        )),
        Err(e) => {
            log::debug!("Preview of {:?} unavailable: {}", metadata.name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Dims, DisplayRange, FileType, Strides};
    use std::path::PathBuf;

    fn record(channels: u32, luts: &[&str]) -> MetadataRecord {
        MetadataRecord {
            filetype: FileType::Container,
            file_path: PathBuf::from("unused.lif"),
            base_position: 0,
            dims: Dims {
                xs: 2,
                ys: 1,
                channels,
                ..Dims::default()
            },
            isrgb: false,
            channel_bits: vec![8; channels as usize],
            strides: Strides::default(),
            display: DisplayRange::default(),
            lut_names: luts.iter().map(|s| s.to_string()).collect(),
            overlap_is_negative: false,
            name: "img".into(),
            uuid: String::new(),
            element: None,
        }
    }

    fn gray(data: Vec<u16>) -> Option<Plane> {
        Some(Plane {
            width: 2,
            height: 1,
            components: 1,
            sample: SampleType::U8,
            data,
        })
    }

    fn planar(channels: Vec<Option<Plane>>) -> ExtractedPlanes {
        ExtractedPlanes::Planar {
            width: 2,
            height: 1,
            channels,
        }
    }

    #[test]
    fn test_all_false_mask_is_black() {
        let meta = record(2, &[]);
        let planes = planar(vec![gray(vec![200, 100]), gray(vec![50, 25])]);
        let image = composite(&planes, &meta, Some(&[false, false]), &NamedColors, &NoStretch);
        assert_eq!(image.data, vec![0; 6]);
    }

    #[test]
    fn test_single_channel_reproduces_its_color() {
        let meta = record(2, &["Red", "Green"]);
        let planes = planar(vec![gray(vec![200, 100]), gray(vec![50, 25])]);
        let image = composite(&planes, &meta, Some(&[true, false]), &NamedColors, &NoStretch);
        assert_eq!(image.pixel(0, 0), [200, 0, 0]);
        assert_eq!(image.pixel(1, 0), [100, 0, 0]);
    }

    #[test]
    fn test_fallback_cycle_and_clipping() {
        let meta = record(2, &[]);
        // channel 0 green, channel 1 magenta
        let planes = planar(vec![gray(vec![200, 10]), gray(vec![100, 10])]);
        let image = composite(&planes, &meta, None, &NamedColors, &NoStretch);
        assert_eq!(image.pixel(0, 0), [100, 200, 100]);

        let planes = planar(vec![gray(vec![255, 255]), gray(vec![255, 255])]);
        let meta = record(2, &["White", "White"]);
        let image = composite(&planes, &meta, None, &NamedColors, &NoStretch);
        assert_eq!(image.pixel(0, 0), [255, 255, 255]);
    }

    #[test]
    fn test_interleaved_bgr_to_display_order() {
        let meta = record(3, &[]);
        let planes = ExtractedPlanes::Interleaved {
            plane: Plane {
                width: 1,
                height: 1,
                components: 3,
                sample: SampleType::U8,
                data: vec![10, 20, 30],
            },
            order: ChannelOrder::Bgr,
        };
        let image = composite(&planes, &meta, None, &NamedColors, &NoStretch);
        assert_eq!(image.data, vec![30, 20, 10]);

        // mask [R off, G on, B on] removes the stored red component
        let image = composite(&planes, &meta, Some(&[false, true, true]), &NamedColors, &NoStretch);
        assert_eq!(image.data, vec![0, 20, 10]);
    }

    #[test]
    fn test_composite_is_deterministic() {
        let meta = record(3, &["Cyan", "", "Yellow"]);
        let planes = planar(vec![
            gray(vec![13, 250]),
            gray(vec![77, 1]),
            gray(vec![199, 128]),
        ]);
        let a = composite(&planes, &meta, None, &NamedColors, &MinMaxStretch);
        let b = composite(&planes, &meta, None, &NamedColors, &MinMaxStretch);
        assert_eq!(a, b);
    }

    #[test]
    fn test_min_max_stretch() {
        let mut image = RgbImage {
            width: 2,
            height: 1,
            sample: SampleType::U8,
            data: vec![10, 0, 7, 60, 0, 7],
        };
        MinMaxStretch.apply(&mut image);
        assert_eq!(image.data, vec![0, 0, 7, 255, 0, 7]);
    }

    #[test]
    fn test_to_rgb8_keeps_high_byte() {
        let image = RgbImage {
            width: 1,
            height: 1,
            sample: SampleType::U16,
            data: vec![0xFF00, 0x0100, 0x00FF],
        };
        let out = image.to_rgb8();
        assert_eq!(out.get_pixel(0, 0).0, [0xFF, 0x01, 0x00]);
    }

    #[test]
    fn test_named_colors() {
        assert_eq!(NamedColors.lookup(" GREY "), Some([255, 255, 255]));
        assert_eq!(NamedColors.lookup("Fire"), None);
    }
}
