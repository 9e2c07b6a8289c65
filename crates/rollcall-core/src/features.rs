//! Extended LBP features — circular neighbor sampling, spatial grid
//! histograms, chi-square distance.
//!
//! Each normalized crop is reduced to one feature vector: an LBP code per
//! interior pixel, an 8×8 grid of per-cell code histograms, and the
//! concatenation of those histograms. The appearance model is the labeled
//! collection of these vectors.

use serde::{Deserialize, Serialize};

/// Parameters of the texture operator and spatial grid.
///
/// All samples in one model share these; changing them requires a full
/// retrain since feature vectors are not comparable across parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Radius of the circular neighborhood, in pixels.
    pub radius: u32,
    /// Number of sampling points on the circle. Bins per cell = 2^neighbors.
    pub neighbors: u32,
    pub grid_rows: u32,
    pub grid_cols: u32,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            radius: 1,
            neighbors: 8,
            grid_rows: 8,
            grid_cols: 8,
        }
    }
}

impl TrainingParams {
    /// Histogram bins per grid cell.
    pub fn bins(&self) -> usize {
        1usize << self.neighbors
    }

    /// Total feature vector length.
    pub fn feature_len(&self) -> usize {
        self.bins() * (self.grid_rows * self.grid_cols) as usize
    }
}

/// Compute the LBP code image for the interior of a grayscale buffer.
///
/// Neighbors are sampled on a circle of `radius` with bilinear
/// interpolation; bit `n` is set when the sampled value is >= the center.
/// Output covers centers at least `radius` from every edge, so its
/// dimensions are (width − 2r) × (height − 2r).
fn lbp_image(pixels: &[u8], width: u32, height: u32, radius: u32, neighbors: u32) -> Vec<u32> {
    let w = width as usize;
    let h = height as usize;
    let r = radius as usize;
    if w <= 2 * r || h <= 2 * r || pixels.len() < w * h {
        return Vec::new();
    }

    // Precompute circle offsets.
    let offsets: Vec<(f32, f32)> = (0..neighbors)
        .map(|n| {
            let angle = 2.0 * std::f32::consts::PI * n as f32 / neighbors as f32;
            (radius as f32 * angle.cos(), -(radius as f32) * angle.sin())
        })
        .collect();

    let out_w = w - 2 * r;
    let out_h = h - 2 * r;
    let mut codes = vec![0u32; out_w * out_h];

    for cy in r..h - r {
        for cx in r..w - r {
            let center = pixels[cy * w + cx] as f32;
            let mut code = 0u32;

            for (bit, &(dx, dy)) in offsets.iter().enumerate() {
                let sx = cx as f32 + dx;
                let sy = cy as f32 + dy;

                let x0 = sx.floor() as usize;
                let y0 = sy.floor() as usize;
                let x1 = (x0 + 1).min(w - 1);
                let y1 = (y0 + 1).min(h - 1);
                let fx = sx - x0 as f32;
                let fy = sy - y0 as f32;

                let tl = pixels[y0 * w + x0] as f32;
                let tr = pixels[y0 * w + x1] as f32;
                let bl = pixels[y1 * w + x0] as f32;
                let br = pixels[y1 * w + x1] as f32;

                let sampled = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                if sampled >= center {
                    code |= 1 << bit;
                }
            }

            codes[(cy - r) * out_w + (cx - r)] = code;
        }
    }

    codes
}

/// Reduce a grayscale crop to its concatenated grid-histogram feature vector.
///
/// The LBP image is partitioned into `grid_rows × grid_cols` cells (edge
/// remainders are dropped); each cell contributes one histogram normalized
/// by its pixel count. A crop too small for the grid yields an all-zero
/// vector of the expected length.
pub fn spatial_histogram(pixels: &[u8], width: u32, height: u32, params: &TrainingParams) -> Vec<f32> {
    let bins = params.bins();
    let mut features = vec![0.0f32; params.feature_len()];

    let codes = lbp_image(pixels, width, height, params.radius, params.neighbors);
    if codes.is_empty() {
        return features;
    }

    let lw = (width - 2 * params.radius) as usize;
    let lh = (height - 2 * params.radius) as usize;
    let cell_w = lw / params.grid_cols as usize;
    let cell_h = lh / params.grid_rows as usize;
    if cell_w == 0 || cell_h == 0 {
        return features;
    }
    let cell_mass = (cell_w * cell_h) as f32;

    for row in 0..params.grid_rows as usize {
        for col in 0..params.grid_cols as usize {
            let cell_idx = row * params.grid_cols as usize + col;
            let hist = &mut features[cell_idx * bins..(cell_idx + 1) * bins];

            for y in row * cell_h..(row + 1) * cell_h {
                for x in col * cell_w..(col + 1) * cell_w {
                    hist[codes[y * lw + x] as usize] += 1.0;
                }
            }
            for v in hist.iter_mut() {
                *v /= cell_mass;
            }
        }
    }

    features
}

/// Chi-square distance between an expected (reference) and observed
/// (probe) histogram vector. Bins empty in the reference are skipped.
pub fn chi_square(expected: &[f32], observed: &[f32]) -> f32 {
    expected
        .iter()
        .zip(observed.iter())
        .filter(|(&e, _)| e > 0.0)
        .map(|(&e, &o)| (e - o) * (e - o) / e)
        .sum()
}
