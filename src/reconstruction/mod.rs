/*!
 * Page reconstruction: translated spans back into page geometry.
 *
 * Output pages are flat element lists in page space (top-left origin). The
 * writer turns them into PDF content streams.
 */

use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;

use crate::document::{Glyph, GraphicObject, SourcePage, Span};
use crate::file_utils::OutputKind;

pub mod typesetting;

pub use self::typesetting::{DEFAULT_FONT, Fitted, Token, fit, tokenize};

/// Distance from the top of a line to its baseline, relative to the font size
const ASCENT: f32 = 0.8;

/// A run of text in a single font
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSegment {
    pub text: String,
    pub font: String,
}

/// One typeset line of a translation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextLine {
    pub span_id: usize,
    /// Left edge
    pub x: f32,
    /// Baseline, page space
    pub y: f32,
    pub font_size: f32,
    pub segments: Vec<TextSegment>,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Drawable content of an output page, in paint order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PageElement {
    Graphic(GraphicObject),
    /// Original glyph kept as is
    Glyph(Glyph),
    Text(TextLine),
}

/// A reconstructed page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputPage {
    /// Source page index
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub rotation: u16,
    pub elements: Vec<PageElement>,
    /// Spans whose translation had to be truncated
    pub overflowed: usize,
}

impl OutputPage {
    /// Typeset lines, in order
    pub fn text_lines(&self) -> impl Iterator<Item = &TextLine> {
        self.elements.iter().filter_map(|e| match e {
            PageElement::Text(line) => Some(line),
            _ => None,
        })
    }
}

/// Reconstruction switches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructOptions {
    /// Inherit source and formula fonts
    pub rich_text: bool,
    /// Put the translated page before the original in dual output
    pub dual_translate_first: bool,
}

/// Builds mono pages and dual page pairs
#[derive(Debug, Clone, Default)]
pub struct PageReconstructor {
    options: ReconstructOptions,
}

impl PageReconstructor {
    pub fn new(options: ReconstructOptions) -> Self {
        Self { options }
    }

    /// The source page unchanged: graphics, then every glyph
    pub fn identity(source: &SourcePage) -> OutputPage {
        let mut elements: Vec<PageElement> =
            source.graphics.iter().cloned().map(PageElement::Graphic).collect();
        elements.extend(source.glyphs.iter().cloned().map(PageElement::Glyph));

        OutputPage {
            index: source.index,
            width: source.width,
            height: source.height,
            rotation: source.rotation,
            elements,
            overflowed: 0,
        }
    }

    /// Page with every translated span replacing its original glyphs
    pub fn mono(&self, source: &SourcePage, spans: &[Span]) -> OutputPage {
        let replaced: HashSet<usize> = spans
            .iter()
            .filter(|s| s.has_translation())
            .flat_map(|s| s.glyphs.iter().copied())
            .collect();

        let mut page = Self::identity(source);
        if replaced.is_empty() {
            return page;
        }

        page.elements.retain(|e| !matches!(e, PageElement::Glyph(_)));
        page.elements.extend(
            source
                .glyphs
                .iter()
                .enumerate()
                .filter(|(i, _)| !replaced.contains(i))
                .map(|(_, g)| PageElement::Glyph(g.clone())),
        );

        for span in spans.iter().filter(|s| s.has_translation()) {
            let (lines, overflowed) = self.typeset(span);
            if overflowed {
                page.overflowed += 1;
            }
            page.elements.extend(lines.into_iter().map(PageElement::Text));
        }

        debug!(
            "Page {}: {} elements, {} overflowed spans",
            source.index + 1,
            page.elements.len(),
            page.overflowed
        );
        page
    }

    /// Output pages of one kind for a source page
    ///
    /// `Mono` yields the translated page; `Dual` yields the original and
    /// translated pages in the configured order.
    pub fn reconstruct(&self, source: &SourcePage, spans: &[Span], kind: OutputKind) -> Vec<OutputPage> {
        let mono = self.mono(source, spans);
        match kind {
            OutputKind::Mono => vec![mono],
            OutputKind::Dual => self.dual_pair(Self::identity(source), mono),
        }
    }

    /// Order an original and a translated page for dual output
    pub fn dual_pair(&self, original: OutputPage, translated: OutputPage) -> Vec<OutputPage> {
        if self.options.dual_translate_first {
            vec![translated, original]
        } else {
            vec![original, translated]
        }
    }

    fn typeset(&self, span: &Span) -> (Vec<TextLine>, bool) {
        let Some(target) = span.target_text.as_deref() else {
            return (Vec::new(), false);
        };
        let base_font = if self.options.rich_text {
            span.font.as_str()
        } else {
            DEFAULT_FONT
        };
        let base_size = if span.font_size > 0.0 { span.font_size } else { span.anchor.height() };
        let width = span.anchor.width().max(base_size);

        let tokens = tokenize(target, &span.formulas);
        let fitted = fit(&tokens, width, span.anchor.height(), base_size);
        if fitted.truncated {
            warn!(
                "Translation of span {} does not fit its box ({:.0}x{:.0}pt), truncated",
                span.id,
                span.anchor.width(),
                span.anchor.height()
            );
        }

        let lines = fitted
            .lines
            .iter()
            .enumerate()
            .map(|(row, tokens)| TextLine {
                span_id: span.id,
                x: span.anchor.x0,
                y: span.anchor.y0
                    + fitted.font_size * ASCENT
                    + row as f32 * fitted.font_size * typesetting::LINE_SPACING,
                font_size: fitted.font_size,
                segments: self.segments(tokens, base_font),
            })
            .collect();
        (lines, fitted.truncated)
    }

    fn segments(&self, tokens: &[Token], base_font: &str) -> Vec<TextSegment> {
        let mut segments: Vec<TextSegment> = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            let font = match (&token.font, self.options.rich_text) {
                (Some(font), true) => font.as_str(),
                _ => base_font,
            };
            let mut text = String::new();
            if i > 0 && token.space_before {
                text.push(' ');
            }
            text.push_str(&token.text);

            match segments.last_mut() {
                Some(last) if last.font == font => last.text.push_str(&text),
                _ => segments.push(TextSegment {
                    text,
                    font: font.to_string(),
                }),
            }
        }
        segments
    }
}
