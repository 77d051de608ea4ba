use log::debug;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use std::path::Path;
use std::sync::Arc;

use super::PdfWriter;
use super::fonts::{EmbeddedFont, FontTable};
use crate::document::{Glyph, GraphicKind, GraphicObject};
use crate::errors::PipelineError;
use crate::file_utils::FileManager;
use crate::reconstruction::{OutputPage, PageElement, TextLine};

/// Baseline offset above the glyph box bottom, relative to the font size
const DESCENT: f32 = 0.2;

/// Writes output pages with lopdf
///
/// Latin text uses the standard-14 fonts; other scripts use the embedded
/// font when it covers them.
#[derive(Debug, Clone, Default)]
pub struct LopdfWriter {
    /// Keep unreferenced objects and uncompressed streams
    pub skip_clean: bool,
    font: Option<Arc<EmbeddedFont>>,
}

impl LopdfWriter {
    pub fn new(skip_clean: bool) -> Self {
        Self {
            skip_clean,
            font: None,
        }
    }

    pub fn with_font(mut self, font: Arc<EmbeddedFont>) -> Self {
        self.font = Some(font);
        self
    }

    fn text_operations(operations: &mut Vec<Operation>, fonts: &mut FontTable, page_height: f32, element: &PageElement) {
        match element {
            PageElement::Glyph(glyph) => Self::glyph_operations(operations, fonts, page_height, glyph),
            PageElement::Text(line) => Self::line_operations(operations, fonts, page_height, line),
            PageElement::Graphic(_) => {}
        }
    }

    fn glyph_operations(operations: &mut Vec<Operation>, fonts: &mut FontTable, page_height: f32, glyph: &Glyph) {
        if glyph.text.trim().is_empty() {
            return;
        }
        let baseline = page_height - (glyph.bbox.y1 - glyph.size * DESCENT);
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Td",
            vec![Object::Real(glyph.bbox.x0), Object::Real(baseline)],
        ));
        for run in fonts.runs(&glyph.font, &glyph.text) {
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(run.resource.clone().into_bytes()), Object::Real(glyph.size)],
            ));
            operations.push(Operation::new("Tj", vec![run.object()]));
        }
        operations.push(Operation::new("ET", vec![]));
    }

    fn line_operations(operations: &mut Vec<Operation>, fonts: &mut FontTable, page_height: f32, line: &TextLine) {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Td",
            vec![Object::Real(line.x), Object::Real(page_height - line.y)],
        ));
        for segment in &line.segments {
            for run in fonts.runs(&segment.font, &segment.text) {
                operations.push(Operation::new(
                    "Tf",
                    vec![Object::Name(run.resource.clone().into_bytes()), Object::Real(line.font_size)],
                ));
                operations.push(Operation::new("Tj", vec![run.object()]));
            }
        }
        operations.push(Operation::new("ET", vec![]));
    }

    /// Graphic without a content fragment: images are shown as a grey box
    fn placeholder_operations(operations: &mut Vec<Operation>, page_height: f32, graphic: &GraphicObject) {
        if graphic.kind != GraphicKind::Image {
            return;
        }
        let bbox = graphic.bbox;
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new("g", vec![Object::Real(0.85)]));
        operations.push(Operation::new(
            "re",
            vec![
                Object::Real(bbox.x0),
                Object::Real(page_height - bbox.y1),
                Object::Real(bbox.width()),
                Object::Real(bbox.height()),
            ],
        ));
        operations.push(Operation::new("f", vec![]));
        operations.push(Operation::new("Q", vec![]));
    }

    /// Content stream of one page
    ///
    /// Raw graphic fragments are spliced between encoded operations so that
    /// paint order is preserved.
    fn page_content(page: &OutputPage, fonts: &mut FontTable) -> Result<Vec<u8>, PipelineError> {
        let mut bytes = Vec::new();
        let mut pending: Vec<Operation> = Vec::new();

        for element in &page.elements {
            match element {
                PageElement::Graphic(GraphicObject { ops: Some(ops), .. }) => {
                    if !pending.is_empty() {
                        let content = Content {
                            operations: std::mem::take(&mut pending),
                        };
                        bytes.extend(content.encode()?);
                        bytes.push(b'\n');
                    }
                    bytes.extend_from_slice(b"q\n");
                    bytes.extend_from_slice(ops.as_bytes());
                    bytes.extend_from_slice(b"\nQ\n");
                }
                PageElement::Graphic(graphic) => {
                    Self::placeholder_operations(&mut pending, page.height, graphic)
                }
                other => Self::text_operations(&mut pending, fonts, page.height, other),
            }
        }

        if !pending.is_empty() {
            let content = Content { operations: pending };
            bytes.extend(content.encode()?);
        }
        Ok(bytes)
    }

    /// Build the PDF document for a page sequence
    pub fn build(&self, pages: &[OutputPage]) -> Result<Document, PipelineError> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let mut fonts = FontTable::new(self.font.clone());

        let mut contents: Vec<(ObjectId, &OutputPage)> = Vec::with_capacity(pages.len());
        for page in pages {
            let content = Self::page_content(page, &mut fonts)?;
            let content_id = document.add_object(Stream::new(Dictionary::new(), content));
            contents.push((content_id, page));
        }

        let font_dictionary = fonts.dictionary(&mut document);
        let resources_id = document.add_object(dictionary! {
            "Font" => font_dictionary,
        });

        let mut kids: Vec<Object> = Vec::with_capacity(contents.len());
        for (content_id, page) in contents {
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(page.width), Object::Real(page.height)],
                "Rotate" => page.rotation as i64,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = document.add_object(dictionary! {
            "Producer" => Object::string_literal("pdfbabel"),
        });
        document.trailer.set("Root", catalog_id);
        document.trailer.set("Info", info_id);

        if !self.skip_clean {
            document.prune_objects();
            document.compress();
        }
        Ok(document)
    }
}

impl PdfWriter for LopdfWriter {
    fn write(&self, pages: &[OutputPage], path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            FileManager::ensure_dir(parent).map_err(|e| PipelineError::Io(e.to_string()))?;
        }
        let mut document = self.build(pages)?;
        document.save(path)?;
        debug!("Wrote {} pages to {:?}", pages.len(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Rect;
    use crate::pdf::fonts::test_font;
    use crate::reconstruction::TextSegment;
    use tempfile::tempdir;

    fn page() -> OutputPage {
        OutputPage {
            index: 0,
            width: 612.0,
            height: 792.0,
            rotation: 0,
            elements: vec![
                PageElement::Graphic(GraphicObject {
                    bbox: Rect::new(0.0, 0.0, 612.0, 1.0),
                    kind: GraphicKind::Path,
                    ops: Some("0 0 m 612 0 l S".to_string()),
                }),
                PageElement::Glyph(Glyph {
                    text: "A".to_string(),
                    bbox: Rect::new(50.0, 50.0, 56.0, 60.0),
                    font: "ABCDEF+Times-Bold".to_string(),
                    size: 10.0,
                }),
                PageElement::Text(TextLine {
                    span_id: 0,
                    x: 50.0,
                    y: 80.0,
                    font_size: 9.0,
                    segments: vec![TextSegment {
                        text: "Bonjour…".to_string(),
                        font: "Helvetica".to_string(),
                    }],
                }),
            ],
            overflowed: 0,
        }
    }

    #[test]
    fn test_write_shouldProduceReadablePdf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("doc.fr.mono.pdf");
        LopdfWriter::new(false).write(&[page(), page()], &path).unwrap();

        let document = Document::load(&path).unwrap();
        assert_eq!(document.get_pages().len(), 2);
    }

    #[test]
    fn test_pageContent_shouldKeepPaintOrder() {
        let mut fonts = FontTable::new(None);
        let bytes = LopdfWriter::page_content(&page(), &mut fonts).unwrap();
        let content = String::from_utf8_lossy(&bytes);

        let graphic = content.find("612 0 l S").unwrap();
        let text = content.find("BT").unwrap();
        assert!(graphic < text);
        assert_eq!(fonts.len(), 2);
    }

    fn chinese_page() -> OutputPage {
        OutputPage {
            index: 0,
            width: 612.0,
            height: 792.0,
            rotation: 0,
            elements: vec![
                PageElement::Text(TextLine {
                    span_id: 0,
                    x: 50.0,
                    y: 80.0,
                    font_size: 10.0,
                    segments: vec![TextSegment {
                        text: "布局分析".to_string(),
                        font: "Times-Roman".to_string(),
                    }],
                }),
                PageElement::Glyph(Glyph {
                    text: "α".to_string(),
                    bbox: Rect::new(50.0, 100.0, 56.0, 110.0),
                    font: "CMMI10".to_string(),
                    size: 10.0,
                }),
            ],
            overflowed: 0,
        }
    }

    fn shown_strings(bytes: &[u8]) -> Vec<Vec<u8>> {
        Content::decode(bytes)
            .unwrap()
            .operations
            .into_iter()
            .filter(|op| op.operator == "Tj")
            .map(|op| op.operands[0].as_str().unwrap().to_vec())
            .collect()
    }

    #[test]
    fn test_pageContent_withNonLatinText_shouldNotReplaceCharacters() {
        let mut fonts = FontTable::new(None);
        let bytes = LopdfWriter::page_content(&chinese_page(), &mut fonts).unwrap();
        let shown = shown_strings(&bytes);

        assert_eq!(
            shown,
            vec![
                vec![0x5E, 0x03, 0x5C, 0x40, 0x52, 0x06, 0x67, 0x90],
                vec![0x03, 0xB1],
            ]
        );
        assert!(shown.iter().all(|s| !s.contains(&b'?')));
    }

    #[test]
    fn test_write_withEmbeddedFont_shouldEmbedCoveredGlyphs() {
        let data = test_font::truetype(&[('布', 1), ('局', 2), ('分', 3), ('析', 4)]);
        let font = Arc::new(EmbeddedFont::from_bytes("TestSerif", data).unwrap());
        let writer = LopdfWriter::new(true).with_font(font);

        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.zh.mono.pdf");
        writer.write(&[chinese_page()], &path).unwrap();

        let document = Document::load(&path).unwrap();
        let type0_fonts: Vec<&Dictionary> = document
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dict| dict.get(b"Subtype").and_then(|s| s.as_name()).ok() == Some(b"Type0".as_slice()))
            .collect();
        // The embedded font and the fallback for α
        assert_eq!(type0_fonts.len(), 2);
        assert!(document.objects.values().any(|object| {
            object
                .as_dict()
                .is_ok_and(|dict| dict.get(b"FontFile2").is_ok())
        }));

        let page_id = *document.get_pages().get(&1).unwrap();
        let shown = shown_strings(&document.get_page_content(page_id).unwrap());
        assert_eq!(shown[0], vec![0, 1, 0, 2, 0, 3, 0, 4]);
    }
}
