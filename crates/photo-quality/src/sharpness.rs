//! Laplacian-variance sharpness estimation
//!
//! A 4-neighbour Laplacian is evaluated on every interior pixel of the luma
//! plane; the population variance of those responses is the blur metric.
//! Sharp edges produce large responses of both signs, so a low variance means
//! a blurry or featureless frame.

use image::{GrayImage, Luma, RgbImage};
use rayon::prelude::*;

/// Luma with the BT.601 weights, truncated to an integer level
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u8
}

/// Convert an RGB working buffer to its luma plane
pub fn luma_plane(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([luma(r, g, b)])
    })
}

/// Population variance of the discrete Laplacian over interior pixels.
///
/// Returns 0.0 when the image has no interior pixels (either side < 3).
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    if width < 3 || height < 3 {
        return 0.0;
    }

    let raw = gray.as_raw();

    // Responses are integers, so the per-row sums are exact and the parallel
    // reduction is order independent.
    let (sum, sum_sq) = (1..height - 1)
        .into_par_iter()
        .map(|y| {
            let mut row_sum = 0i64;
            let mut row_sum_sq = 0i64;
            for x in 1..width - 1 {
                let idx = y * width + x;
                let center = raw[idx] as i64;
                let laplacian = raw[idx - width] as i64
                    + raw[idx + width] as i64
                    + raw[idx - 1] as i64
                    + raw[idx + 1] as i64
                    - 4 * center;
                row_sum += laplacian;
                row_sum_sq += laplacian * laplacian;
            }
            (row_sum, row_sum_sq)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    let count = ((width - 2) * (height - 2)) as i128;
    let numerator = count * sum_sq as i128 - (sum as i128) * (sum as i128);
    numerator as f64 / (count as f64 * count as f64)
}

/// Variance of an RGB working buffer, converting to luma first
pub fn estimate(rgb: &RgbImage) -> f64 {
    laplacian_variance(&luma_plane(rgb))
}

/// Map a raw variance onto the 0–100 sharpness sub-score
pub fn sharpness_score(variance: f64) -> f64 {
    (variance / 10.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 149);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_flat_image_has_zero_variance() {
        let flat = RgbImage::from_pixel(32, 32, Rgb([90, 120, 200]));
        assert_eq!(estimate(&flat), 0.0);
    }

    #[test]
    fn test_tiny_image_has_no_interior() {
        let tiny = GrayImage::from_pixel(2, 100, Luma([255]));
        assert_eq!(laplacian_variance(&tiny), 0.0);

        let thin = GrayImage::from_pixel(100, 2, Luma([0]));
        assert_eq!(laplacian_variance(&thin), 0.0);
    }

    #[test]
    fn test_single_bright_pixel_variance() {
        // 3x3 image has exactly one interior pixel: a single response means zero variance
        let mut one = GrayImage::from_pixel(3, 3, Luma([0]));
        one.put_pixel(1, 1, Luma([100]));
        assert_eq!(laplacian_variance(&one), 0.0);

        // 4x3 image: interior pixels (1,1) and (2,1)
        // (1,1) = 100 center -> 0+0+0+0-400 = -400; (2,1) neighbour -> 100
        let mut two = GrayImage::from_pixel(4, 3, Luma([0]));
        two.put_pixel(1, 1, Luma([100]));
        let mean = (-400.0 + 100.0) / 2.0;
        let expected = ((-400.0f64 - mean).powi(2) + (100.0f64 - mean).powi(2)) / 2.0;
        assert_eq!(laplacian_variance(&two), expected);
    }

    #[test]
    fn test_checkerboard_is_sharper_than_gradient() {
        let checker = RgbImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let gradient = RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 4) as u8;
            Rgb([v, v, v])
        });

        let sharp = estimate(&checker);
        let soft = estimate(&gradient);
        assert!(sharp > 100.0);
        assert!(soft < 100.0);
        assert!(sharp > soft);
    }

    #[test]
    fn test_sharpness_score_clamps() {
        assert_eq!(sharpness_score(0.0), 0.0);
        assert_eq!(sharpness_score(250.0), 25.0);
        assert_eq!(sharpness_score(5000.0), 100.0);
    }
}
