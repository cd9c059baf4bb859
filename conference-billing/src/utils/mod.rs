// Utils module

use anyhow::Result;
use image::{DynamicImage, Luma};
use qrcode::QrCode;
use std::io::Cursor;

/// Render `data` as a QR code PNG.
pub fn generate_qr_png(data: &str) -> Result<Vec<u8>> {
    let code = QrCode::new(data.as_bytes())?;
    let image = code.render::<Luma<u8>>().quiet_zone(true).build();

    let dynamic_image = DynamicImage::ImageLuma8(image);
    let mut buffer = Cursor::new(Vec::new());
    dynamic_image.write_to(&mut buffer, image::ImageOutputFormat::Png)?;

    Ok(buffer.into_inner())
}
