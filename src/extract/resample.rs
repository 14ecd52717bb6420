//! Area-average resampling.
//!
//! Each destination pixel is the coverage-weighted mean of the source pixels
//! its footprint overlaps, computed as two separable passes (horizontal, then
//! vertical). Equal source and destination sizes return the input unchanged.

/// Source contributions for one destination index.
type Taps = Vec<(usize, f64)>;

/// Build per-destination coverage weights along one axis.
fn area_weights(src: usize, dst: usize) -> Vec<Taps> {
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|d| {
            let start = d as f64 * scale;
            let end = (d as f64 + 1.0) * scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src);
            let mut taps = Vec::with_capacity(last.saturating_sub(first));
            for s in first..last {
                let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                if overlap > 1e-12 {
                    taps.push((s, overlap / scale));
                }
            }
            taps
        })
        .collect()
}

/// Resample interleaved samples with an area-average filter.
///
/// `src` holds `height * width * components` samples. The result is rounded
/// to the nearest integer and clipped to `max_value`.
pub fn resample_area(
    src: &[u16],
    width: usize,
    height: usize,
    components: usize,
    dst_width: usize,
    dst_height: usize,
    max_value: u16,
) -> Vec<u16> {
    if width == dst_width && height == dst_height {
        return src.to_vec();
    }
    if dst_width == 0 || dst_height == 0 || width == 0 || height == 0 {
        return Vec::new();
    }

    let x_taps = area_weights(width, dst_width);
    let y_taps = area_weights(height, dst_height);

    // Horizontal pass: height x dst_width
    let mut temp = vec![0.0f64; height * dst_width * components];
    for y in 0..height {
        let row = y * width * components;
        for (dx, taps) in x_taps.iter().enumerate() {
            let out = (y * dst_width + dx) * components;
            for &(sx, w) in taps {
                let idx = row + sx * components;
                for c in 0..components {
                    temp[out + c] += src[idx + c] as f64 * w;
                }
            }
        }
    }

    // Vertical pass: dst_height x dst_width
    let max = max_value as f64;
    let mut dst = vec![0u16; dst_height * dst_width * components];
    let mut acc = vec![0.0f64; dst_width * components];
    for (dy, taps) in y_taps.iter().enumerate() {
        acc.iter_mut().for_each(|v| *v = 0.0);
        for &(sy, w) in taps {
            let row = &temp[sy * dst_width * components..(sy + 1) * dst_width * components];
            for (a, v) in acc.iter_mut().zip(row) {
                *a += v * w;
            }
        }
        let out = &mut dst[dy * dst_width * components..(dy + 1) * dst_width * components];
        for (o, a) in out.iter_mut().zip(&acc) {
            *o = a.round().clamp(0.0, max) as u16;
        }
    }

    dst
}

/// Output width preserving aspect ratio for a requested height.
pub fn scaled_width(width: usize, height: usize, output_height: usize) -> usize {
    if height == 0 {
        return 0;
    }
    ((width as f64 * output_height as f64 / height as f64).round() as usize).max(1)
}
