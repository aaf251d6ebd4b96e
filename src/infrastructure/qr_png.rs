use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use tracing::warn;

use crate::domain::repositories::QrRenderer;

/// Pixel size of one QR module
const MODULE_SIZE: u32 = 10;

/// Black-on-white PNG QR codes with medium error correction
#[derive(Debug, Clone, Default)]
pub struct PngQrRenderer;

impl PngQrRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl QrRenderer for PngQrRenderer {
    fn render(&self, text: &str) -> Option<Vec<u8>> {
        let code = match QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M) {
            Ok(code) => code,
            Err(e) => {
                warn!("Failed to encode '{}' as QR code: {}", text, e);
                return None;
            }
        };

        let image = code
            .render::<Luma<u8>>()
            .module_dimensions(MODULE_SIZE, MODULE_SIZE)
            .quiet_zone(true)
            .build();

        let mut png = Vec::new();
        if let Err(e) = DynamicImage::ImageLuma8(image).write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
            warn!("Failed to write QR code PNG: {}", e);
            return None;
        }

        Some(png)
    }
}
