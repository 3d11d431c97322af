//! Draw component boxes over the source photo.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::circuit::Component;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: u32 = 3;

/// Copy of `image` with each component outlined, clipped at the borders.
pub fn annotate(image: &RgbImage, components: &[Component]) -> RgbImage {
    let mut canvas = image.clone();
    for component in components {
        if component.bbox.is_degenerate() {
            continue;
        }
        let c = component.bbox.corners();
        // Corners past the border are pulled in just far enough that the
        // clipped edges stay off the canvas.
        let pad = BOX_THICKNESS as i64 + 1;
        let clamp_x = |v: f64| (v as i64).clamp(-pad, canvas.width() as i64 + pad);
        let clamp_y = |v: f64| (v as i64).clamp(-pad, canvas.height() as i64 + pad);
        let (x1, y1) = (clamp_x(c.x1), clamp_y(c.y1));
        let (x2, y2) = (clamp_x(c.x2), clamp_y(c.y2));
        // Nested one-pixel outlines growing inwards.
        for inset in 0..BOX_THICKNESS as i64 {
            let w = x2 - x1 - 2 * inset;
            let h = y2 - y1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let (Ok(left), Ok(top), Ok(w), Ok(h)) = (
                i32::try_from(x1 + inset),
                i32::try_from(y1 + inset),
                u32::try_from(w),
                u32::try_from(h),
            ) else {
                break;
            };
            draw_hollow_rect_mut(&mut canvas, Rect::at(left, top).of_size(w, h), BOX_COLOR);
        }
    }
    canvas
}
