/*!
 * Intermediate document layer and the per-run page model.
 *
 * Coordinates are PDF points with a top-left origin and y growing downward.
 * The intermediate layer (`IlDocument`, `SourcePage`, `Glyph`,
 * `GraphicObject`) is what an external parser hands over; regions and spans
 * are derived from it during a run.
 */

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::reconstruction::OutputPage;

/// Axis-aligned rectangle in page space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    /// Create a rectangle, normalizing the corner order
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Whether a point lies inside, edges included
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Smallest rectangle covering both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Length of the shared vertical extent, zero when disjoint
    pub fn vertical_overlap(&self, other: &Rect) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    /// Multiply every coordinate by a factor
    pub fn scale(&self, factor: f32) -> Rect {
        Rect {
            x0: self.x0 * factor,
            y0: self.y0 * factor,
            x1: self.x1 * factor,
            y1: self.y1 * factor,
        }
    }
}

/// A single positioned grapheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Glyph {
    pub text: String,
    pub bbox: Rect,
    pub font: String,
    pub size: f32,
}

/// Kind of non-text content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphicKind {
    Image,
    Path,
    #[default]
    Other,
}

/// Non-text content, copied through to every output page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicObject {
    pub bbox: Rect,
    #[serde(default)]
    pub kind: GraphicKind,
    /// Raw content-stream fragment, in PDF user space
    #[serde(default)]
    pub ops: Option<String>,
}

/// One page of the intermediate layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePage {
    /// 0-based page index in the source document
    pub index: usize,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub rotation: u16,
    #[serde(default)]
    pub glyphs: Vec<Glyph>,
    #[serde(default)]
    pub graphics: Vec<GraphicObject>,
}

/// Parsed document handed over by the external parser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IlDocument {
    pub source: PathBuf,
    pub pages: Vec<SourcePage>,
}

/// Region type emitted by layout classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Text,
    Title,
    Figure,
    Formula,
    Table,
}

impl RegionKind {
    /// Priority when a glyph falls into several regions, higher wins
    pub fn assignment_priority(self) -> u8 {
        match self {
            Self::Formula => 5,
            Self::Figure => 4,
            Self::Table => 3,
            Self::Title => 2,
            Self::Text => 1,
        }
    }

    /// Whether glyphs of this region become spans
    pub fn bears_text(self) -> bool {
        matches!(self, Self::Text | Self::Title | Self::Formula)
    }
}

/// A typed box on a page, immutable once classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bbox: Rect,
    pub kind: RegionKind,
    pub confidence: f32,
}

impl Region {
    pub fn new(bbox: Rect, kind: RegionKind, confidence: f32) -> Self {
        Self {
            bbox,
            kind,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// An inline formula carried through translation as a placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaRun {
    /// Placeholder text, e.g. `{v0}`
    pub placeholder: String,
    pub text: String,
    pub font: String,
    pub size: f32,
}

/// Translation state of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanStatus {
    Pending,
    Translated,
    /// Backend failed, the original text is kept
    Failed,
    /// Formula or non-translatable text, kept verbatim
    Skipped,
}

/// Ordered text run within one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Position in page reading order
    pub id: usize,
    /// Index into the page's region list
    pub region: usize,
    pub region_kind: RegionKind,
    pub source_text: String,
    pub target_text: Option<String>,
    pub is_formula: bool,
    /// Dominant font of the span
    pub font: String,
    pub font_size: f32,
    /// Area the translation is laid out in; its width is the available width
    pub anchor: Rect,
    /// Page glyph indices replaced by this span on output
    pub glyphs: Vec<usize>,
    #[serde(default)]
    pub formulas: Vec<FormulaRun>,
    pub status: SpanStatus,
}

impl Span {
    /// Whether the reconstructor should typeset a translation for this span
    pub fn has_translation(&self) -> bool {
        self.status == SpanStatus::Translated && self.target_text.is_some()
    }
}

/// Processing state of one page during a run
#[derive(Debug, Clone)]
pub struct Page {
    pub source: SourcePage,
    pub regions: Vec<Region>,
    pub spans: Vec<Span>,
    pub output: Option<OutputPage>,
}

impl Page {
    pub fn new(source: SourcePage) -> Self {
        Self {
            source,
            regions: Vec::new(),
            spans: Vec::new(),
            output: None,
        }
    }

    /// 1-based page number, as shown to users
    pub fn number(&self) -> usize {
        self.source.index + 1
    }
}

/// A document being translated; owns its pages for the duration of a run
#[derive(Debug, Clone)]
pub struct Document {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Resolved 1-based page numbers
    pub selected: Vec<usize>,
    pub pages: Vec<Page>,
}
