//! Separable Gaussian smoothing over a row-major grid.

use rayon::prelude::*;

/// Kernel weights for offsets `-radius..=radius` (in cells), truncated at
/// three standard deviations. A zero sigma yields the identity kernel.
pub fn gaussian_kernel(sigma_cells: f64) -> Vec<f64> {
    if sigma_cells <= f64::EPSILON {
        return vec![1.0];
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let radius = (3.0 * sigma_cells).ceil() as usize;
    let two_sigma_sq = 2.0 * sigma_cells * sigma_cells;
    (0..=2 * radius)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let d = i as f64 - radius as f64;
            (-(d * d) / two_sigma_sq).exp()
        })
        .collect()
}

/// Convolves `grid` (`rows` × `cols`, row-major) with `kernel` along both
/// axes. Cells beyond the grid edge count as zero.
pub fn smooth(grid: &[f64], rows: usize, cols: usize, kernel: &[f64]) -> Vec<f64> {
    if kernel.len() == 1 {
        return grid.to_vec();
    }
    let radius = kernel.len() / 2;

    let mut horizontal = vec![0.0; grid.len()];
    horizontal
        .par_chunks_mut(cols)
        .zip(grid.par_chunks(cols))
        .for_each(|(out, row)| {
            for (c, cell) in out.iter_mut().enumerate() {
                let lo = c.saturating_sub(radius);
                let hi = (c + radius).min(cols - 1);
                *cell = (lo..=hi)
                    .map(|k| row[k] * kernel[k + radius - c])
                    .sum();
            }
        });

    let mut vertical = vec![0.0; grid.len()];
    vertical
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(r, out)| {
            let lo = r.saturating_sub(radius);
            let hi = (r + radius).min(rows - 1);
            for k in lo..=hi {
                let weight = kernel[k + radius - r];
                let source = &horizontal[k * cols..(k + 1) * cols];
                for (cell, value) in out.iter_mut().zip(source) {
                    *cell += value * weight;
                }
            }
        });

    vertical
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_symmetric_and_peaks_in_the_middle() {
        let kernel = gaussian_kernel(2.0);
        assert_eq!(kernel.len(), 13);
        assert!((kernel[6] - 1.0).abs() < f64::EPSILON);
        for i in 0..6 {
            assert!((kernel[i] - kernel[12 - i]).abs() < 1e-12);
            assert!(kernel[i] < kernel[i + 1]);
        }
    }

    #[test]
    fn zero_sigma_is_identity() {
        let grid = vec![0.0, 3.0, 0.0, 1.0];
        assert_eq!(smooth(&grid, 2, 2, &gaussian_kernel(0.0)), grid);
    }

    #[test]
    fn spreads_a_point_mass_symmetrically() {
        let mut grid = vec![0.0; 25];
        grid[12] = 1.0;
        let smoothed = smooth(&grid, 5, 5, &gaussian_kernel(1.0));

        assert!((smoothed[12] - 1.0).abs() < 1e-12);
        assert!(smoothed[11] > 0.0 && smoothed[11] < smoothed[12]);
        assert!((smoothed[11] - smoothed[13]).abs() < 1e-12);
        assert!((smoothed[7] - smoothed[17]).abs() < 1e-12);
        assert!(smoothed[0] < smoothed[6]);
    }
}
