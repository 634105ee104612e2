//! PNG dumps of test renders

use std::{fs::File, path::Path};

use clray::renderer::Image;

/// Writes the per-sample average, scaled by `exposure` and gamma corrected
pub fn save_png(image: &Image, exposure: f32, output_path: &Path) {
    let file = File::create(output_path).expect("failed to create output file");
    let mut encoder = png::Encoder::new(file, image.width, image.height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_source_gamma(png::ScaledFloat::new(1.0 / 2.2));

    let mut writer = encoder.write_header().expect("failed to write PNG header");

    let to_byte = |c: f32| ((c * exposure).max(0.0).powf(1.0 / 2.2) * 255.0).clamp(0.0, 255.0) as u8;
    let image_data: Vec<u8> = image.averaged().iter().flat_map(|v| [to_byte(v.0), to_byte(v.1), to_byte(v.2)]).collect();

    writer.write_image_data(&image_data).expect("failed to write PNG data");
}
