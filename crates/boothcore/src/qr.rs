use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};

use crate::error::AppResult;

/// Rendered side length in pixels (lower bound, the renderer rounds up to
/// a whole number of modules)
const QR_SIZE: u32 = 512;

/// `https://t.me/<bot>?start=<payload>`
pub fn deep_link(bot_username: &str, payload: &str) -> String {
    format!("https://t.me/{}?start={}", bot_username.trim_start_matches('@'), payload)
}

/// Encodes `data` as a PNG QR code
pub fn render_png(data: &str) -> AppResult<Vec<u8>> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_SIZE, QR_SIZE)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(image).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}
