use image::RgbImage;
use ndarray::Array1;

/// Side of the square pixel block averaged into one feature.
pub const DOWNSAMPLE: u32 = 4;

/// Number of features for an image of `(height, width)`.
pub fn feature_dim(input_shape: (u32, u32)) -> usize {
    let (height, width) = input_shape;
    (height.div_ceil(DOWNSAMPLE) * width.div_ceil(DOWNSAMPLE)) as usize
}

/// Grayscale, block-averaged and scaled to [0, 1], row major.
pub fn extract(image: &RgbImage) -> Array1<f32> {
    let (width, height) = image.dimensions();
    let cols = width.div_ceil(DOWNSAMPLE);
    let rows = height.div_ceil(DOWNSAMPLE);
    let mut out = Array1::<f32>::zeros((rows * cols) as usize);

    for by in 0..rows {
        for bx in 0..cols {
            let mut sum = 0.0f32;
            let mut count = 0u32;
            for y in (by * DOWNSAMPLE)..((by + 1) * DOWNSAMPLE).min(height) {
                for x in (bx * DOWNSAMPLE)..((bx + 1) * DOWNSAMPLE).min(width) {
                    let [r, g, b] = image.get_pixel(x, y).0;
                    //ITU-R 601 luma
                    sum += 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
                    count += 1;
                }
            }
            out[(by * cols + bx) as usize] = sum / (count as f32 * 255.0);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn dims_round_up_partial_blocks() {
        assert_eq!(feature_dim((120, 160)), 30 * 40);
        assert_eq!(feature_dim((6, 5)), 2 * 2);
    }

    #[test]
    fn white_and_black_blocks() {
        let image = RgbImage::from_fn(8, 4, |x, _| if x < 4 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) });
        let f = extract(&image);
        assert_eq!(f.len(), 2);
        assert!((f[0] - 1.0).abs() < 1e-4);
        assert_eq!(f[1], 0.0);
    }
}
