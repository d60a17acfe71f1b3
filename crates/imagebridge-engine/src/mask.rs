use image::{DynamicImage, GenericImageView, RgbImage, Rgba, RgbaImage};

use crate::error::{BridgeError, Result};

fn ensure_dimensions(mask: &DynamicImage, width: u32, height: u32) -> Result<()> {
    let (mask_width, mask_height) = mask.dimensions();
    if (mask_width, mask_height) != (width, height) {
        return Err(BridgeError::DimensionMismatch {
            mask_width,
            mask_height,
            image_width: width,
            image_height: height,
        });
    }
    Ok(())
}

/// Converts a white-means-edit mask into the transparency convention of
/// dedicated edit endpoints: alpha is `255 - gray`, RGB is zeroed.
///
/// `width`/`height` are the base image's dimensions.
pub fn to_edit_mask(mask: &DynamicImage, width: u32, height: u32) -> Result<RgbaImage> {
    ensure_dimensions(mask, width, height)?;
    let gray = mask.to_luma8();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0];
        Rgba([0, 0, 0, 255 - value])
    }))
}

/// Plain RGB rendering of the mask for chat-embedded edits (white still
/// means edit; no inversion).
pub fn to_rgb_mask(mask: &DynamicImage, width: u32, height: u32) -> Result<RgbImage> {
    ensure_dimensions(mask, width, height)?;
    Ok(mask.to_rgb8())
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

    use super::{to_edit_mask, to_rgb_mask};
    use crate::error::BridgeError;

    #[test]
    fn all_black_mask_is_fully_opaque() -> anyhow::Result<()> {
        let mask = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 6, Luma([0])));
        let out = to_edit_mask(&mask, 8, 6)?;
        assert!(out.pixels().all(|pixel| pixel.0 == [0, 0, 0, 255]));
        Ok(())
    }

    #[test]
    fn all_white_mask_is_fully_transparent() -> anyhow::Result<()> {
        let mask = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 6, Luma([255])));
        let out = to_edit_mask(&mask, 8, 6)?;
        assert!(out.pixels().all(|pixel| pixel.0 == [0, 0, 0, 0]));
        Ok(())
    }

    #[test]
    fn intermediate_values_are_inverted_exactly() -> anyhow::Result<()> {
        let mask = DynamicImage::ImageLuma8(GrayImage::from_fn(256, 1, |x, _| Luma([x as u8])));
        let out = to_edit_mask(&mask, 256, 1)?;
        for x in 0..256u32 {
            assert_eq!(out.get_pixel(x, 0)[3], 255 - x as u8);
        }
        Ok(())
    }

    #[test]
    fn rgb_masks_are_reduced_to_gray_first() -> anyhow::Result<()> {
        let mask = DynamicImage::ImageRgb8(RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }));
        let out = to_edit_mask(&mask, 2, 1)?;
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(1, 0)[3], 255);
        Ok(())
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let mask = DynamicImage::ImageLuma8(GrayImage::new(4, 4));
        assert!(matches!(
            to_edit_mask(&mask, 5, 4),
            Err(BridgeError::DimensionMismatch {
                mask_width: 4,
                image_width: 5,
                ..
            })
        ));
        assert!(to_rgb_mask(&mask, 4, 5).is_err());
    }

    #[test]
    fn rgb_mask_keeps_white_as_white() -> anyhow::Result<()> {
        let mask = DynamicImage::ImageLuma8(GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 255 } else { 0 }])));
        let out = to_rgb_mask(&mask, 2, 1)?;
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(1, 0), &Rgb([0, 0, 0]));
        Ok(())
    }
}
