/*!
 * Document input and PDF output.
 *
 * - `il_json`: reads the intermediate layer produced by the external parser
 * - `writer`: writes reconstructed pages with lopdf
 * - `fonts`: standard, embedded TrueType and predefined CJK fonts
 */

use std::fmt::Debug;
use std::path::Path;

use crate::document::IlDocument;
use crate::errors::PipelineError;
use crate::reconstruction::OutputPage;

/// Source of parsed documents
pub trait DocumentParser: Send + Sync + Debug {
    /// Parse a document into its intermediate layer
    fn parse(&self, path: &Path) -> Result<IlDocument, PipelineError>;
}

/// Sink for reconstructed pages
pub trait PdfWriter: Send + Sync + Debug {
    /// Write `pages`, in order, as one PDF file
    fn write(&self, pages: &[OutputPage], path: &Path) -> Result<(), PipelineError>;
}

pub mod fonts;
pub mod il_json;
pub mod writer;

pub use self::fonts::{EmbeddedFont, standard_font};
pub use self::il_json::JsonIlParser;
pub use self::writer::LopdfWriter;
