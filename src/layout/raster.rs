/*!
 * Page rasterization for layout analysis.
 *
 * The intermediate layer carries no pixels, so pages are rendered from
 * geometry: glyphs become bars over their ink band, images become solid
 * fills and other graphics become outlines.
 */

use image::{GrayImage, ImageFormat, Luma};
use std::io::Cursor;

use crate::document::{GraphicKind, Rect, Region, SourcePage};
use crate::errors::LayoutError;

/// Longest side of a rendered page, in pixels
pub const REFERENCE_RESOLUTION: u32 = 1024;

const INK: Luma<u8> = Luma([0u8]);
const PAPER: Luma<u8> = Luma([255u8]);

/// Grayscale raster of one page
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: GrayImage,
    /// Pixels per PDF point
    pub scale: f32,
}

impl PageImage {
    /// Render a page at the reference resolution
    pub fn render(page: &SourcePage) -> Self {
        let longest = page.width.max(page.height).max(1.0);
        let scale = REFERENCE_RESOLUTION as f32 / longest;
        let width = ((page.width * scale).round() as u32).max(1);
        let height = ((page.height * scale).round() as u32).max(1);

        let mut image = GrayImage::from_pixel(width, height, PAPER);

        for graphic in &page.graphics {
            let rect = graphic.bbox.scale(scale);
            match graphic.kind {
                GraphicKind::Image => fill(&mut image, &rect),
                GraphicKind::Path | GraphicKind::Other => outline(&mut image, &rect),
            }
        }

        for glyph in &page.glyphs {
            if glyph.text.trim().is_empty() {
                continue;
            }
            // Ink of a glyph sits roughly between 20% and 80% of its box
            let b = glyph.bbox;
            let band = Rect::new(
                b.x0,
                b.y0 + b.height() * 0.2,
                b.x1,
                b.y1 - b.height() * 0.2,
            );
            fill(&mut image, &band.scale(scale));
        }

        Self { image, scale }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Result<Vec<u8>, LayoutError> {
        let mut output = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .map_err(|e| LayoutError::Image(e.to_string()))?;
        Ok(output)
    }

    /// Map a region from pixel space back to page space
    pub fn to_page_space(&self, region: &Region) -> Region {
        Region {
            bbox: region.bbox.scale(1.0 / self.scale),
            ..region.clone()
        }
    }
}

fn pixel_bounds(image: &GrayImage, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
    let max_x = image.width() as f32;
    let max_y = image.height() as f32;
    let x0 = rect.x0.floor().clamp(0.0, max_x) as u32;
    let y0 = rect.y0.floor().clamp(0.0, max_y) as u32;
    let x1 = rect.x1.ceil().clamp(0.0, max_x) as u32;
    let y1 = rect.y1.ceil().clamp(0.0, max_y) as u32;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

fn fill(image: &mut GrayImage, rect: &Rect) {
    if let Some((x0, y0, x1, y1)) = pixel_bounds(image, rect) {
        for y in y0..y1 {
            for x in x0..x1 {
                image.put_pixel(x, y, INK);
            }
        }
    }
}

fn outline(image: &mut GrayImage, rect: &Rect) {
    if let Some((x0, y0, x1, y1)) = pixel_bounds(image, rect) {
        for x in x0..x1 {
            image.put_pixel(x, y0, INK);
            image.put_pixel(x, y1 - 1, INK);
        }
        for y in y0..y1 {
            image.put_pixel(x0, y, INK);
            image.put_pixel(x1 - 1, y, INK);
        }
    }
}
