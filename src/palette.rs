//! Representative-color extraction for a normalized square cover.
//!
//! Background selection is anchored to the alpha-weighted average of the
//! image's border ring rather than plain dominant-color extraction, so the
//! resting panel tone never clashes with the cover's visible edge. The hover
//! tone is the quantized cluster farthest from that background.

use image::RgbaImage;

/// Seed color used when quantization finds nothing to cluster.
const FALLBACK_COLOR: [u8; 3] = [170, 160, 120];
const CLUSTER_COUNT: usize = 3;

/// The two colors published for a cover: a resting background tone and a
/// contrasting hover accent, both as `rgba(r,g,b,a)` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPair {
    pub hover: String,
    pub background: String,
}

pub fn format_rgba(color: [u8; 3], alpha: f64) -> String {
    format!("rgba({},{},{},{alpha:.3})", color[0], color[1], color[2])
}

/// Derives the background/hover pair from a square cover image.
pub fn extract_pair(image: &RgbaImage) -> ColorPair {
    let clusters = quantize_clusters(image);
    let border = border_average(image);

    let background_index = nearest_cluster(&clusters, border);
    let hover_index = farthest_cluster(&clusters, clusters[background_index]);

    ColorPair {
        hover: format_rgba(clusters[hover_index], 1.0),
        background: format_rgba(clusters[background_index], 1.0),
    }
}

fn distance_squared(a: [u8; 3], b: [u8; 3]) -> u32 {
    let dr = i32::from(a[0]) - i32::from(b[0]);
    let dg = i32::from(a[1]) - i32::from(b[1]);
    let db = i32::from(a[2]) - i32::from(b[2]);
    (dr * dr + dg * dg + db * db) as u32
}

fn nearest_cluster(clusters: &[[u8; 3]], reference: [u8; 3]) -> usize {
    let mut best = 0;
    for (index, cluster) in clusters.iter().enumerate() {
        if distance_squared(*cluster, reference) < distance_squared(clusters[best], reference) {
            best = index;
        }
    }
    best
}

fn farthest_cluster(clusters: &[[u8; 3]], reference: [u8; 3]) -> usize {
    let mut best = 0;
    for (index, cluster) in clusters.iter().enumerate() {
        if distance_squared(*cluster, reference) > distance_squared(clusters[best], reference) {
            best = index;
        }
    }
    best
}

/// Alpha-weighted average over the border ring (ring width is one sixth of
/// the short edge, minimum one pixel). A fully transparent border falls back
/// to an unweighted average over the whole image as opaque RGB, and a
/// zero-pixel image yields pure black.
fn border_average(image: &RgbaImage) -> [u8; 3] {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return [0, 0, 0];
    }

    let ring = (width.min(height) / 6).max(1);
    let mut sum_r = 0u64;
    let mut sum_g = 0u64;
    let mut sum_b = 0u64;
    let mut sum_a = 0u64;
    for (x, y, pixel) in image.enumerate_pixels() {
        let in_ring = x < ring || x >= width - ring || y < ring || y >= height - ring;
        if !in_ring || pixel[3] == 0 {
            continue;
        }
        let alpha = u64::from(pixel[3]);
        sum_r += u64::from(pixel[0]) * alpha;
        sum_g += u64::from(pixel[1]) * alpha;
        sum_b += u64::from(pixel[2]) * alpha;
        sum_a += alpha;
    }
    if sum_a > 0 {
        return [
            (sum_r / sum_a) as u8,
            (sum_g / sum_a) as u8,
            (sum_b / sum_a) as u8,
        ];
    }

    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for pixel in image.pixels() {
        sum[0] += u64::from(pixel[0]);
        sum[1] += u64::from(pixel[1]);
        sum[2] += u64::from(pixel[2]);
        count += 1;
    }
    if count == 0 {
        return [0, 0, 0];
    }
    [
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    ]
}

/// Median-cut quantization to exactly `CLUSTER_COUNT` representative colors.
/// Near-uniform images legitimately collapse to fewer boxes; the result is
/// padded by repeating the last color.
fn quantize_clusters(image: &RgbaImage) -> Vec<[u8; 3]> {
    let pixels: Vec<[u8; 3]> = image
        .pixels()
        .filter(|pixel| pixel[3] > 0)
        .map(|pixel| [pixel[0], pixel[1], pixel[2]])
        .collect();

    let mut clusters = median_cut(pixels, CLUSTER_COUNT);
    if clusters.is_empty() {
        clusters.push(FALLBACK_COLOR);
    }
    while clusters.len() < CLUSTER_COUNT {
        let last = clusters[clusters.len() - 1];
        clusters.push(last);
    }
    clusters
}

fn median_cut(pixels: Vec<[u8; 3]>, target_boxes: usize) -> Vec<[u8; 3]> {
    if pixels.is_empty() {
        return Vec::new();
    }

    let mut boxes = vec![pixels];
    while boxes.len() < target_boxes {
        // Split the box with the widest channel spread at its median.
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, pixels)| pixels.len() > 1)
            .map(|(index, pixels)| {
                let (channel, spread) = widest_channel(pixels);
                (index, channel, spread)
            })
            .filter(|(_, _, spread)| *spread > 0)
            .max_by_key(|(_, _, spread)| *spread);
        let Some((box_index, channel, _)) = candidate else {
            break;
        };

        let mut splitting = boxes.swap_remove(box_index);
        splitting.sort_unstable_by_key(|pixel| pixel[channel]);
        let upper = splitting.split_off(splitting.len() / 2);
        boxes.push(splitting);
        boxes.push(upper);
    }

    boxes.iter().map(|pixels| box_average(pixels)).collect()
}

fn widest_channel(pixels: &[[u8; 3]]) -> (usize, u8) {
    let mut min = [u8::MAX; 3];
    let mut max = [u8::MIN; 3];
    for pixel in pixels {
        for channel in 0..3 {
            min[channel] = min[channel].min(pixel[channel]);
            max[channel] = max[channel].max(pixel[channel]);
        }
    }
    let mut widest = 0;
    for channel in 1..3 {
        if max[channel] - min[channel] > max[widest] - min[widest] {
            widest = channel;
        }
    }
    (widest, max[widest] - min[widest])
}

fn box_average(pixels: &[[u8; 3]]) -> [u8; 3] {
    let mut sum = [0u64; 3];
    for pixel in pixels {
        for channel in 0..3 {
            sum[channel] += u64::from(pixel[channel]);
        }
    }
    let count = pixels.len().max(1) as u64;
    [
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
    ]
}
