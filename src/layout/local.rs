use async_trait::async_trait;
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use imageproc::region_labelling::{Connectivity, connected_components};
use log::debug;

use super::{LayoutClassifier, PageImage};
use crate::document::{Rect, Region, RegionKind};
use crate::errors::LayoutError;

type Labels = ImageBuffer<Luma<u32>, Vec<u32>>;

/// In-process block classifier working on the page raster
///
/// Ink is binarized and dilated so that the glyphs of a paragraph merge into
/// one connected component. Each component is then cut into horizontal bands
/// of its undilated ink (see `classify_band`), and each band becomes a region.
#[derive(Debug, Clone)]
pub struct RasterBlockClassifier {
    /// Dilation radius in PDF points
    pub dilation_pt: f32,
    /// Tallest ink run, in PDF points, still read as one line of text
    pub line_band_max_pt: f32,
    /// Ink density a taller run needs to be a figure
    pub figure_min_density: f32,
    /// Components with fewer ink pixels are noise
    pub min_ink_pixels: usize,
}

impl Default for RasterBlockClassifier {
    fn default() -> Self {
        Self {
            dilation_pt: 4.0,
            line_band_max_pt: 28.0,
            figure_min_density: 0.35,
            min_ink_pixels: 4,
        }
    }
}

struct Block {
    label: u32,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    ink: usize,
}

/// Horizontal slice of a block, in pixel space
///
/// Either one ink run taller than a line (`solid`), or consecutive
/// line-height runs separated by blank rows.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Band {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    ink: usize,
    /// Ink runs merged into the band
    lines: usize,
    solid: bool,
}

impl Band {
    fn density(&self) -> f32 {
        let area = (self.x1 - self.x0 + 1) as f32 * (self.y1 - self.y0 + 1) as f32;
        self.ink as f32 / area
    }

    fn absorb(&mut self, run: Band) {
        self.x0 = self.x0.min(run.x0);
        self.x1 = self.x1.max(run.x1);
        self.y1 = run.y1;
        self.ink += run.ink;
        self.lines += run.lines;
    }
}

/// Cut a block into bands; runs of at most `max_line_px` rows are lines
fn bands(block: &Block, ink: &GrayImage, labels: &Labels, max_line_px: u32) -> Vec<Band> {
    let mut runs: Vec<Band> = Vec::new();
    let mut open = false;
    for y in block.y0..=block.y1 {
        let mut row: Option<(u32, u32, usize)> = None;
        for x in block.x0..=block.x1 {
            if ink.get_pixel(x, y)[0] != 0 && labels.get_pixel(x, y)[0] == block.label {
                row = Some(match row {
                    Some((x0, _, count)) => (x0, x, count + 1),
                    None => (x, x, 1),
                });
            }
        }

        let Some((x0, x1, count)) = row else {
            open = false;
            continue;
        };
        let line = Band {
            x0,
            y0: y,
            x1,
            y1: y,
            ink: count,
            lines: 1,
            solid: false,
        };
        match runs.last_mut() {
            Some(run) if open => run.absorb(Band { lines: 0, ..line }),
            _ => runs.push(line),
        }
        open = true;
    }

    let mut merged: Vec<Band> = Vec::new();
    for mut run in runs {
        run.solid = run.y1 - run.y0 + 1 > max_line_px;
        match merged.last_mut() {
            Some(last) if !last.solid && !run.solid => last.absorb(run),
            _ => merged.push(run),
        }
    }
    merged
}

impl RasterBlockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn binarize(image: &GrayImage) -> GrayImage {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if image.get_pixel(x, y)[0] < 128 {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }

    /// Decide the kind of a band
    ///
    /// 1. Line bands (one or more runs no taller than `line_band_max_pt`)
    ///    are text whatever their density.
    /// 2. A solid band with density of at least `figure_min_density` is a
    ///    figure.
    /// 3. A sparse solid band, such as a frame outline, is text.
    fn classify_band(&self, band: &Band) -> Region {
        let density = band.density();
        let (kind, confidence) = if !band.solid {
            let confidence = if band.lines >= 2 { 0.9 } else { 0.8 };
            (RegionKind::Text, confidence)
        } else if density >= self.figure_min_density {
            (RegionKind::Figure, 0.5 + density / 2.0)
        } else {
            (RegionKind::Text, 0.5 + (1.0 - density) / 2.0)
        };

        Region::new(
            Rect::new(
                band.x0 as f32,
                band.y0 as f32,
                (band.x1 + 1) as f32,
                (band.y1 + 1) as f32,
            ),
            kind,
            confidence,
        )
    }

    /// Detect blocks, in pixel space
    pub fn detect(&self, page: &PageImage) -> Vec<Region> {
        let ink = Self::binarize(&page.image);
        let radius = (self.dilation_pt * page.scale).round().max(1.0) as u8;
        let dilated = morphology::dilate(&ink, Norm::LInf, radius);
        let labels = connected_components(&dilated, Connectivity::Eight, Luma([0u8]));

        let mut blocks: Vec<Option<Block>> = Vec::new();
        for (x, y, pixel) in ink.enumerate_pixels() {
            if pixel[0] == 0 {
                continue;
            }
            let label = labels.get_pixel(x, y)[0] as usize;
            if label == 0 {
                continue;
            }
            if blocks.len() <= label {
                blocks.resize_with(label + 1, || None);
            }
            match &mut blocks[label] {
                Some(block) => {
                    block.x0 = block.x0.min(x);
                    block.y0 = block.y0.min(y);
                    block.x1 = block.x1.max(x);
                    block.y1 = block.y1.max(y);
                    block.ink += 1;
                }
                slot @ None => {
                    *slot = Some(Block {
                        label: label as u32,
                        x0: x,
                        y0: y,
                        x1: x,
                        y1: y,
                        ink: 1,
                    });
                }
            }
        }

        let max_line_px = (self.line_band_max_pt * page.scale).round().max(1.0) as u32;
        let regions: Vec<Region> = blocks
            .into_iter()
            .flatten()
            .filter(|block| block.ink >= self.min_ink_pixels)
            .flat_map(|block| bands(&block, &ink, &labels, max_line_px))
            .map(|band| self.classify_band(&band))
            .collect();

        debug!("Raster classifier found {} blocks", regions.len());
        regions
    }
}

#[async_trait]
impl LayoutClassifier for RasterBlockClassifier {
    fn name(&self) -> &str {
        "raster"
    }

    async fn classify(&self, page: &PageImage) -> Result<Vec<Region>, LayoutError> {
        Ok(self.detect(page))
    }

    async fn health_check(&self) -> Result<(), LayoutError> {
        Ok(())
    }
}
