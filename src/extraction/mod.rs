/*!
 * Span extraction: glyphs and regions in, ordered spans out.
 *
 * Glyphs are assigned to regions, grouped into lines and paragraphs, and
 * every paragraph of a text-bearing region becomes one span. Formula lines
 * become verbatim spans; inline formulas become `{vN}` placeholders when rich
 * text translation is enabled.
 */

use log::debug;
use std::collections::HashMap;

use crate::app_config::Config;
use crate::document::{FormulaRun, Glyph, Region, RegionKind, SourcePage, Span, SpanStatus};
use crate::errors::PipelineError;
use crate::translation::normalize_text;
use crate::translation::scheduler::placeholder;

pub mod formula;
pub mod paragraph;

pub use self::formula::{DEFAULT_CHAR_PATTERN, DEFAULT_FONT_PATTERN, FormulaDetector};
pub use self::paragraph::{Line, PARAGRAPH_GAP_FACTOR, build_lines, median, split_paragraphs};

/// Share of formula glyphs above which a whole line is a formula
const FORMULA_LINE_RATIO: f32 = 0.5;

/// Extraction switches
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOptions {
    pub split_short_lines: bool,
    pub short_line_split_factor: f32,
    /// Replace inline formulas with placeholders
    pub rich_text: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            split_short_lines: false,
            short_line_split_factor: 0.8,
            rich_text: true,
        }
    }
}

impl ExtractionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            split_short_lines: config.extraction.split_short_lines,
            short_line_split_factor: config.extraction.short_line_split_factor,
            rich_text: config.rich_text(),
        }
    }
}

/// Lines of one text-bearing region
struct RegionLines {
    region: usize,
    kind: RegionKind,
    lines: Vec<Line>,
    formula_lines: Vec<bool>,
}

/// Turns a classified page into ordered spans
#[derive(Debug, Clone, Default)]
pub struct SpanExtractor {
    detector: FormulaDetector,
    options: ExtractionOptions,
}

impl SpanExtractor {
    pub fn new(detector: FormulaDetector, options: ExtractionOptions) -> Self {
        Self { detector, options }
    }

    /// Build an extractor from the configuration, compiling the formula patterns
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let detector = FormulaDetector::new(
            config.extraction.formula_font_pattern.as_deref(),
            config.extraction.formula_char_pattern.as_deref(),
        )?;
        Ok(Self::new(detector, ExtractionOptions::from_config(config)))
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// Assign every glyph to at most one region
    ///
    /// The region must contain the glyph center; ties go to the higher kind
    /// priority, then to the higher confidence.
    pub fn assign_glyphs(page: &SourcePage, regions: &[Region]) -> Vec<Option<usize>> {
        page.glyphs
            .iter()
            .map(|glyph| {
                let (cx, cy) = glyph.bbox.center();
                regions
                    .iter()
                    .enumerate()
                    .filter(|(_, region)| region.bbox.contains_point(cx, cy))
                    .max_by(|(_, a), (_, b)| {
                        a.kind
                            .assignment_priority()
                            .cmp(&b.kind.assignment_priority())
                            .then(a.confidence.total_cmp(&b.confidence))
                    })
                    .map(|(index, _)| index)
            })
            .collect()
    }

    /// Region indices in reading order: top edge, then left edge
    pub fn reading_order(regions: &[Region]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..regions.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&regions[a].bbox, &regions[b].bbox);
            ra.y0.total_cmp(&rb.y0).then(ra.x0.total_cmp(&rb.x0))
        });
        order
    }

    fn is_formula_line(&self, glyphs: &[Glyph], line: &Line) -> bool {
        let mut total = 0usize;
        let mut formula = 0usize;
        for &index in &line.glyphs {
            let glyph = &glyphs[index];
            if glyph.text.trim().is_empty() {
                continue;
            }
            total += 1;
            if self.detector.is_formula_glyph(glyph) {
                formula += 1;
            }
        }
        total > 0 && formula as f32 / total as f32 > FORMULA_LINE_RATIO
    }

    /// Extract the spans of one page in reading order
    pub fn extract(&self, page: &SourcePage, regions: &[Region]) -> Vec<Span> {
        let assignment = Self::assign_glyphs(page, regions);
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); regions.len()];
        for (glyph, region) in assignment.iter().enumerate() {
            if let Some(region) = region {
                members[*region].push(glyph);
            }
        }

        let mut grouped: Vec<RegionLines> = Vec::new();
        for region in Self::reading_order(regions) {
            let kind = regions[region].kind;
            if !kind.bears_text() || members[region].is_empty() {
                continue;
            }
            let lines = build_lines(&page.glyphs, &members[region]);
            let formula_lines = lines
                .iter()
                .map(|line| kind == RegionKind::Formula || self.is_formula_line(&page.glyphs, line))
                .collect();
            grouped.push(RegionLines {
                region,
                kind,
                lines,
                formula_lines,
            });
        }

        let short_line_width = if self.options.split_short_lines {
            let widths: Vec<f32> = grouped
                .iter()
                .flat_map(|g| g.lines.iter().map(Line::width))
                .collect();
            Some(median(&widths) * self.options.short_line_split_factor)
        } else {
            None
        };

        let mut spans = Vec::new();
        for group in &grouped {
            for paragraph in split_paragraphs(&group.lines, &group.formula_lines, short_line_width) {
                let is_formula = paragraph.iter().all(|&i| group.formula_lines[i]);
                let lines: Vec<&Line> = paragraph.iter().map(|&i| &group.lines[i]).collect();
                if let Some(span) = self.build_span(page, group, &lines, is_formula, spans.len()) {
                    spans.push(span);
                }
            }
        }

        debug!(
            "Page {}: {} glyphs, {} regions, {} spans",
            page.index + 1,
            page.glyphs.len(),
            regions.len(),
            spans.len()
        );
        spans
    }

    fn build_span(
        &self,
        page: &SourcePage,
        group: &RegionLines,
        lines: &[&Line],
        is_formula: bool,
        id: usize,
    ) -> Option<Span> {
        let glyphs = &page.glyphs;
        let mut text = String::new();
        let mut formulas: Vec<FormulaRun> = Vec::new();

        for line in lines {
            let line_text = if is_formula {
                paragraph::assemble_text(glyphs, &line.glyphs)
            } else {
                self.line_text(glyphs, line, &mut formulas)
            };
            paragraph::join_lines(&mut text, &line_text);
        }

        let text = normalize_text(&text);
        if text.is_empty() {
            return None;
        }

        let members: Vec<usize> = lines.iter().flat_map(|l| l.glyphs.iter().copied()).collect();
        let anchor = lines
            .iter()
            .map(|l| l.bbox)
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default();
        let (font, font_size) = self.dominant_font(glyphs, &members, is_formula);

        Some(Span {
            id,
            region: group.region,
            region_kind: group.kind,
            source_text: text,
            target_text: None,
            is_formula,
            font,
            font_size,
            anchor,
            glyphs: members,
            formulas,
            status: SpanStatus::Pending,
        })
    }

    /// Text of a non-formula line, with formula runs as placeholders or inline
    fn line_text(&self, glyphs: &[Glyph], line: &Line, formulas: &mut Vec<FormulaRun>) -> String {
        let mut text = String::new();
        let mut previous: Option<&Glyph> = None;

        for (is_formula, run) in self.runs(glyphs, line) {
            let first = &glyphs[run[0]];
            let last = run
                .iter()
                .rev()
                .map(|&i| &glyphs[i])
                .find(|g| !g.text.trim().is_empty())
                .unwrap_or(first);
            if let Some(prev) = previous {
                if paragraph::needs_space(prev, first) && !text.ends_with(' ') {
                    text.push(' ');
                }
            }

            let run_text = paragraph::assemble_text(glyphs, &run);
            if is_formula && self.options.rich_text {
                let marker = placeholder(formulas.len());
                text.push_str(&marker);
                formulas.push(FormulaRun {
                    placeholder: marker,
                    text: run_text.trim().to_string(),
                    font: first.font.clone(),
                    size: first.size,
                });
            } else {
                text.push_str(&run_text);
            }
            previous = Some(last);
        }
        text
    }

    /// Maximal runs of formula and non-formula glyphs along a line
    ///
    /// Whitespace between two formula glyphs belongs to the formula run.
    fn runs(&self, glyphs: &[Glyph], line: &Line) -> Vec<(bool, Vec<usize>)> {
        let flags: Vec<Option<bool>> = line
            .glyphs
            .iter()
            .map(|&i| {
                let glyph = &glyphs[i];
                (!glyph.text.trim().is_empty()).then(|| self.detector.is_formula_glyph(glyph))
            })
            .collect();

        let resolved: Vec<bool> = (0..flags.len())
            .map(|i| match flags[i] {
                Some(flag) => flag,
                None => {
                    let before = flags[..i].iter().rev().flatten().next().copied();
                    let after = flags[i + 1..].iter().flatten().next().copied();
                    before == Some(true) && after == Some(true)
                }
            })
            .collect();

        let mut runs: Vec<(bool, Vec<usize>)> = Vec::new();
        for (position, &index) in line.glyphs.iter().enumerate() {
            let flag = resolved[position];
            match runs.last_mut() {
                Some((current, members)) if *current == flag => members.push(index),
                _ => runs.push((flag, vec![index])),
            }
        }
        runs
    }

    /// Most frequent font and median size of the span's text glyphs
    fn dominant_font(&self, glyphs: &[Glyph], members: &[usize], is_formula: bool) -> (String, f32) {
        let text_glyphs: Vec<&Glyph> = members
            .iter()
            .map(|&i| &glyphs[i])
            .filter(|g| !g.text.trim().is_empty())
            .collect();
        let preferred: Vec<&Glyph> = if is_formula {
            text_glyphs.clone()
        } else {
            text_glyphs
                .iter()
                .copied()
                .filter(|g| !self.detector.is_formula_glyph(g))
                .collect()
        };
        let candidates = if preferred.is_empty() { text_glyphs } else { preferred };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for glyph in &candidates {
            *counts.entry(glyph.font.as_str()).or_insert(0) += 1;
        }
        let font = candidates
            .iter()
            .map(|g| g.font.as_str())
            .max_by_key(|font| counts.get(font).copied().unwrap_or(0))
            .unwrap_or_default()
            .to_string();
        let sizes: Vec<f32> = candidates.iter().map(|g| g.size).collect();

        (font, median(&sizes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Rect;

    fn word(glyphs: &mut Vec<Glyph>, text: &str, x: f32, y: f32, font: &str) -> f32 {
        let mut x = x;
        for c in text.chars() {
            glyphs.push(Glyph {
                text: c.to_string(),
                bbox: Rect::new(x, y, x + 5.0, y + 10.0),
                font: font.to_string(),
                size: 10.0,
            });
            x += 5.0;
        }
        x
    }

    fn page(glyphs: Vec<Glyph>) -> SourcePage {
        SourcePage {
            index: 0,
            width: 612.0,
            height: 792.0,
            rotation: 0,
            glyphs,
            graphics: Vec::new(),
        }
    }

    #[test]
    fn test_assignGlyphs_withOverlappingRegions_shouldPreferFormula() {
        let mut glyphs = Vec::new();
        word(&mut glyphs, "ab", 10.0, 10.0, "Times-Roman");
        let page = page(glyphs);
        let regions = vec![
            Region::new(Rect::new(0.0, 0.0, 100.0, 100.0), RegionKind::Text, 0.99),
            Region::new(Rect::new(0.0, 0.0, 13.0, 30.0), RegionKind::Formula, 0.4),
        ];

        let assignment = SpanExtractor::assign_glyphs(&page, &regions);
        assert_eq!(assignment, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_extract_withTwoRegions_shouldFollowReadingOrder() {
        let mut glyphs = Vec::new();
        word(&mut glyphs, "Second", 50.0, 300.0, "Times-Roman");
        word(&mut glyphs, "Title", 50.0, 50.0, "Times-Bold");
        word(&mut glyphs, "loose", 500.0, 700.0, "Times-Roman");
        let page = page(glyphs);
        let regions = vec![
            Region::new(Rect::new(40.0, 290.0, 300.0, 320.0), RegionKind::Text, 0.9),
            Region::new(Rect::new(40.0, 40.0, 300.0, 70.0), RegionKind::Title, 0.9),
        ];

        let spans = SpanExtractor::default().extract(&page, &regions);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].source_text, "Title");
        assert_eq!(spans[0].region, 1);
        assert_eq!(spans[0].font, "Times-Bold");
        assert_eq!(spans[1].source_text, "Second");
        assert_eq!(spans[1].id, 1);
        assert!(spans.iter().all(|s| s.status == SpanStatus::Pending));
    }

    #[test]
    fn test_extract_withInlineFormula_shouldUsePlaceholder() {
        let mut glyphs = Vec::new();
        let x = word(&mut glyphs, "let", 50.0, 100.0, "Times-Roman");
        let x = word(&mut glyphs, "x", x + 5.0, 100.0, "CMMI10");
        word(&mut glyphs, "grow", x + 5.0, 100.0, "Times-Roman");
        let page = page(glyphs);
        let regions = vec![Region::new(Rect::new(0.0, 90.0, 300.0, 120.0), RegionKind::Text, 0.9)];

        let spans = SpanExtractor::default().extract(&page, &regions);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].source_text, "let {v0} grow");
        assert_eq!(spans[0].formulas.len(), 1);
        assert_eq!(spans[0].formulas[0].text, "x");
        assert_eq!(spans[0].formulas[0].font, "CMMI10");
        assert!(!spans[0].is_formula);

        let plain = SpanExtractor::new(
            FormulaDetector::default(),
            ExtractionOptions {
                rich_text: false,
                ..ExtractionOptions::default()
            },
        );
        let spans = plain.extract(&page, &regions);
        assert_eq!(spans[0].source_text, "let x grow");
        assert!(spans[0].formulas.is_empty());
    }

    #[test]
    fn test_extract_withFormulaLine_shouldMarkFormulaSpan() {
        let mut glyphs = Vec::new();
        word(&mut glyphs, "Some text here", 50.0, 100.0, "Times-Roman");
        word(&mut glyphs, "a=b+c", 80.0, 130.0, "CMMI10");
        word(&mut glyphs, "More text", 50.0, 142.0, "Times-Roman");
        let page = page(glyphs);
        let regions = vec![Region::new(Rect::new(0.0, 90.0, 300.0, 160.0), RegionKind::Text, 0.9)];

        let spans = SpanExtractor::default().extract(&page, &regions);
        assert_eq!(spans.len(), 3);
        assert!(spans[1].is_formula);
        assert_eq!(spans[1].source_text, "a=b+c");
        assert!(!spans[0].is_formula && !spans[2].is_formula);
    }

    #[test]
    fn test_extract_withFigureRegion_shouldNotProduceSpans() {
        let mut glyphs = Vec::new();
        word(&mut glyphs, "axis", 100.0, 100.0, "Helvetica");
        let page = page(glyphs);
        let regions = vec![
            Region::new(Rect::new(0.0, 0.0, 300.0, 300.0), RegionKind::Text, 0.9),
            Region::new(Rect::new(90.0, 90.0, 200.0, 200.0), RegionKind::Figure, 0.9),
        ];

        assert!(SpanExtractor::default().extract(&page, &regions).is_empty());
    }
}
