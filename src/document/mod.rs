/*!
 * Document model: the intermediate layer handed over by the parser, the
 * regions and spans derived from it, and page selection.
 */

pub mod model;
pub mod pages;

pub use self::model::{
    Document, FormulaRun, Glyph, GraphicKind, GraphicObject, IlDocument, Page, Rect, Region,
    RegionKind, SourcePage, Span, SpanStatus,
};
pub use self::pages::PageSelection;
