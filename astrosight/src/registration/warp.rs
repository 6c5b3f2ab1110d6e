//! Resampling a frame into reference space.

use glam::DVec2;

use crate::image::Image;
use crate::registration::result::RegistrationError;
use crate::registration::transform::Homography;

/// Sub-pixel slack before a source coordinate counts as outside the frame.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Warp `image` with `homography`, which maps image coordinates onto output coordinates.
///
/// Each output pixel p is sampled at H⁻¹·p with bilinear interpolation per
/// channel. Pixels whose source lies outside the image are 0. Output has the
/// input's dimensions.
pub fn warp_image(image: &Image, homography: &Homography) -> Result<Image, RegistrationError> {
    let inverse = homography
        .inverse()
        .ok_or(RegistrationError::DegenerateHomography)?;

    let dims = image.dimensions();
    let mut out = Image::try_new(dims)?;
    if dims.pixel_count() == 0 {
        return Ok(out);
    }

    let channels = dims.channels;
    common::parallel::for_each_row_mut(out.pixels_mut(), dims.row_len(), |y, row| {
        for (x, pixel) in row.chunks_exact_mut(channels).enumerate() {
            let src = inverse.apply(DVec2::new(x as f64, y as f64));
            bilinear_sample_into(image, src, pixel);
        }
    });

    Ok(out)
}

/// Bilinear sample of every channel at `p`, or zeros when `p` is outside the image.
#[inline]
fn bilinear_sample_into(image: &Image, p: DVec2, out: &mut [f32]) {
    let max_x = (image.width() - 1) as f64;
    let max_y = (image.height() - 1) as f64;
    if !p.is_finite()
        || p.x < -EDGE_TOLERANCE
        || p.y < -EDGE_TOLERANCE
        || p.x > max_x + EDGE_TOLERANCE
        || p.y > max_y + EDGE_TOLERANCE
    {
        out.fill(0.0);
        return;
    }

    let x = p.x.clamp(0.0, max_x);
    let y = p.y.clamp(0.0, max_y);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    for (c, v) in out.iter_mut().enumerate() {
        let p00 = image.get(x0, y0, c);
        let p10 = image.get(x1, y0, c);
        let p01 = image.get(x0, y1, c);
        let p11 = image.get(x1, y1, c);
        let top = p00 + fx * (p10 - p00);
        let bottom = p01 + fx * (p11 - p01);
        *v = top + fy * (bottom - top);
    }
}
