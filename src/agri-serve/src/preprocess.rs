use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::Result;

/// Square input resolution the pest model was trained on.
pub const INPUT_SIZE: u32 = 224;

/// Colour channels per pixel.
pub const CHANNELS: u64 = 3;

/// A dense `f32` tensor in NHWC layout, ready to be fed to the model.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    pub shape: [u64; 4],
    pub data: Vec<f32>,
}

impl InputTensor {
    pub fn batch_size(&self) -> u64 {
        self.shape[0]
    }
}

/// Resizes to the model resolution, scales every channel to `[0, 1]` and
/// prepends a batch dimension of 1. Nearest-neighbour sampling matches the
/// loader the model was trained with.
pub fn image_to_tensor(image: &DynamicImage) -> InputTensor {
    let rgb = image.to_rgb8();

    let resized = image::imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, FilterType::Nearest);

    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|x| x as f32 / 255f32)
        .collect();

    InputTensor {
        shape: [1, INPUT_SIZE as u64, INPUT_SIZE as u64, CHANNELS],
        data,
    }
}

/// Decodes raw image bytes in any supported format.
pub fn decode(data: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(data)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::{ImageBuffer, ImageOutputFormat, Rgb};

    use super::*;
    use crate::error::Error;

    /// Encodes a small solid-colour PNG.
    pub(crate) fn png_bytes(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb(pixel));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn produces_batched_model_shape() {
        let tensor = image_to_tensor(&decode(&png_bytes(40, 30, [255, 0, 51])).unwrap());

        assert_eq!(tensor.shape, [1, 224, 224, 3]);
        assert_eq!(tensor.batch_size(), 1);
        assert_eq!(tensor.data.len(), 224 * 224 * 3);
    }

    #[test]
    fn normalizes_channels_to_unit_range() {
        let tensor = image_to_tensor(&decode(&png_bytes(8, 8, [255, 0, 51])).unwrap());

        assert!(tensor.data.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((tensor.data[0] - 1.0).abs() < 1e-6);
        assert!(tensor.data[1].abs() < 1e-6);
        assert!((tensor.data[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn rejects_undecodable_bytes() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
        assert!(!err.is_client_error());
    }
}
