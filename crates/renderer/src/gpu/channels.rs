use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::{self, flip_vertical_in_place, FilterType};
use image::{GenericImageView, Rgba, RgbaImage};

use super::backend::Size;

/// Spacing of the built-in grid decoration, matching the keyboard cell step.
const GRID_CELL: (u32, u32) = (10, 20);

/// Loads a decoration bitmap from disk as RGBA8.
pub fn load_decoration(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to open decoration at {}", path.display()))?;
    let (width, height) = image.dimensions();
    tracing::debug!(path = %path.display(), width, height, "loaded decoration");
    Ok(image.to_rgba8())
}

/// The 2D "texture canvas" sampled by shaders through `iChannel0`.
///
/// A solid fill, optionally with a decorative bitmap composited on top.
/// Without a loaded bitmap the decoration is a faint cell grid.
#[derive(Debug, Clone)]
pub struct BackgroundCanvas {
    size: Size,
    color: [f32; 4],
    decoration: Option<RgbaImage>,
    show_decoration: bool,
}

impl BackgroundCanvas {
    pub fn new(size: Size) -> Self {
        Self {
            size: size.at_least_one(),
            color: [0.0, 0.0, 0.0, 1.0],
            decoration: None,
            show_decoration: false,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn resize(&mut self, size: Size) {
        self.size = size.at_least_one();
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    pub fn set_color(&mut self, color: [f32; 4]) {
        self.color = color;
    }

    pub fn set_decoration(&mut self, decoration: Option<RgbaImage>) {
        self.decoration = decoration;
    }

    pub fn show_decoration(&self) -> bool {
        self.show_decoration
    }

    pub fn set_show_decoration(&mut self, show: bool) {
        self.show_decoration = show;
    }

    /// Paints the canvas in image orientation (row 0 at the top).
    pub fn paint(&self) -> RgbaImage {
        let fill = Rgba(self.color.map(to_byte));
        let mut canvas = RgbaImage::from_pixel(self.size.width, self.size.height, fill);
        if !self.show_decoration {
            return canvas;
        }
        match &self.decoration {
            Some(decoration) => {
                let fitted = fit_within(decoration, self.size);
                let x = (i64::from(self.size.width) - i64::from(fitted.width())) / 2;
                let y = (i64::from(self.size.height) - i64::from(fitted.height())) / 2;
                imageops::overlay(&mut canvas, &fitted, x, y);
            }
            None => draw_grid(&mut canvas, fill),
        }
        canvas
    }

    /// Pixels ready for upload: painted, then flipped so row 0 is the bottom.
    pub fn texture_pixels(&self) -> Vec<u8> {
        let mut canvas = self.paint();
        flip_vertical_in_place(&mut canvas);
        canvas.into_raw()
    }
}

fn to_byte(component: f32) -> u8 {
    if component.is_nan() {
        return 0;
    }
    (component.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn fit_within(image: &RgbaImage, size: Size) -> RgbaImage {
    if image.width() <= size.width && image.height() <= size.height {
        return image.clone();
    }
    let scale = f64::min(
        f64::from(size.width) / f64::from(image.width()),
        f64::from(size.height) / f64::from(image.height()),
    );
    let width = ((f64::from(image.width()) * scale).floor() as u32).max(1);
    let height = ((f64::from(image.height()) * scale).floor() as u32).max(1);
    imageops::resize(image, width, height, FilterType::Triangle)
}

fn draw_grid(canvas: &mut RgbaImage, fill: Rgba<u8>) {
    let line = contrast(fill);
    let (cell_x, cell_y) = GRID_CELL;
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        if x % cell_x == 0 || y % cell_y == 0 {
            *pixel = line;
        }
    }
}

fn contrast(fill: Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, a] = fill.0;
    let luma = (u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000;
    let shift = |c: u8| if luma > 127 { c.saturating_sub(40) } else { c.saturating_add(40) };
    Rgba([shift(r), shift(g), shift(b), a])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_canvas_is_solid_fill() {
        let mut canvas = BackgroundCanvas::new(Size::new(4, 3));
        canvas.set_color([1.0, 0.0, 0.5, 1.0]);
        let pixels = canvas.texture_pixels();
        assert_eq!(pixels.len(), 4 * 3 * 4);
        assert!(pixels.chunks(4).all(|px| px == [255, 0, 128, 255]));
    }

    #[test]
    fn decoration_is_centered_and_flipped_for_upload() {
        let mut canvas = BackgroundCanvas::new(Size::new(4, 4));
        let mut decoration = RgbaImage::from_pixel(2, 1, Rgba([0, 255, 0, 255]));
        decoration.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        canvas.set_decoration(Some(decoration));
        canvas.set_show_decoration(true);

        let painted = canvas.paint();
        assert_eq!(painted.get_pixel(1, 1), &Rgba([0, 255, 0, 255]));
        assert_eq!(painted.get_pixel(2, 1), &Rgba([0, 0, 255, 255]));

        let flipped = canvas.texture_pixels();
        let row = 2usize;
        let offset = (row * 4 + 1) * 4;
        assert_eq!(&flipped[offset..offset + 4], &[0, 255, 0, 255]);
    }

    #[test]
    fn oversized_decoration_is_scaled_down() {
        let mut canvas = BackgroundCanvas::new(Size::new(8, 8));
        canvas.set_decoration(Some(RgbaImage::from_pixel(32, 16, Rgba([9, 9, 9, 255]))));
        canvas.set_show_decoration(true);
        let painted = canvas.paint();
        assert_eq!(painted.dimensions(), (8, 8));
        assert_eq!(painted.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(painted.get_pixel(0, 3), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn built_in_grid_marks_cell_edges() {
        let mut canvas = BackgroundCanvas::new(Size::new(21, 41));
        canvas.set_show_decoration(true);
        let painted = canvas.paint();
        assert_ne!(painted.get_pixel(10, 5), painted.get_pixel(5, 5));
        assert_ne!(painted.get_pixel(5, 20), painted.get_pixel(5, 5));
    }
}
