use std::cmp::Ordering;

use crate::document::{Glyph, Rect};

/// Minimum vertical overlap, relative to the smaller height, for a glyph to join a line
pub const LINE_OVERLAP: f32 = 0.5;

/// Gaps wider than this fraction of the font size insert a space
pub const WORD_GAP_FACTOR: f32 = 0.25;

/// Vertical gap, relative to the median line height, that starts a new paragraph
pub const PARAGRAPH_GAP_FACTOR: f32 = 1.0;

/// Indent, relative to the font size, that starts a new paragraph
pub const INDENT_FACTOR: f32 = 2.0;

/// A visual line of glyphs, left to right
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Page glyph indices sorted by x
    pub glyphs: Vec<usize>,
    pub bbox: Rect,
    /// Largest glyph size on the line
    pub font_size: f32,
}

impl Line {
    fn start(index: usize, glyph: &Glyph) -> Self {
        Self {
            glyphs: vec![index],
            bbox: glyph.bbox,
            font_size: glyph.size,
        }
    }

    fn accepts(&self, glyph: &Glyph) -> bool {
        let smaller = glyph.bbox.height().min(self.bbox.height());
        if smaller <= 0.0 {
            return self.bbox.vertical_overlap(&glyph.bbox) > 0.0 || glyph.bbox.y0 == self.bbox.y0;
        }
        self.bbox.vertical_overlap(&glyph.bbox) >= LINE_OVERLAP * smaller
    }

    fn push(&mut self, index: usize, glyph: &Glyph) {
        self.glyphs.push(index);
        self.bbox = self.bbox.union(&glyph.bbox);
        self.font_size = self.font_size.max(glyph.size);
    }

    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    pub fn height(&self) -> f32 {
        self.bbox.height()
    }
}

/// Group glyphs into lines by vertical overlap
pub fn build_lines(glyphs: &[Glyph], indices: &[usize]) -> Vec<Line> {
    let mut order: Vec<usize> = indices.to_vec();
    order.sort_by(|&a, &b| {
        let (ax, ay) = glyphs[a].bbox.center();
        let (bx, by) = glyphs[b].bbox.center();
        ay.total_cmp(&by).then(ax.total_cmp(&bx))
    });

    let mut lines: Vec<Line> = Vec::new();
    for index in order {
        let glyph = &glyphs[index];
        match lines.last_mut() {
            Some(line) if line.accepts(glyph) => line.push(index, glyph),
            _ => lines.push(Line::start(index, glyph)),
        }
    }

    for line in &mut lines {
        line.glyphs
            .sort_by(|&a, &b| glyphs[a].bbox.x0.total_cmp(&glyphs[b].bbox.x0));
    }
    lines
}

/// Whether a space separates two neighbouring glyphs
pub fn needs_space(previous: &Glyph, next: &Glyph) -> bool {
    let size = previous.size.max(next.size);
    next.bbox.x0 - previous.bbox.x1 > WORD_GAP_FACTOR * size
}

/// Assemble the text of consecutive glyphs, inserting spaces at wide gaps
pub fn assemble_text(glyphs: &[Glyph], indices: &[usize]) -> String {
    let mut text = String::new();
    let mut previous: Option<&Glyph> = None;

    for &index in indices {
        let glyph = &glyphs[index];
        if glyph.text.trim().is_empty() {
            if !text.is_empty() && !text.ends_with(' ') {
                text.push(' ');
            }
            continue;
        }
        if let Some(prev) = previous {
            if needs_space(prev, glyph) && !text.ends_with(' ') {
                text.push(' ');
            }
        }
        text.push_str(&glyph.text);
        previous = Some(glyph);
    }
    text
}

/// Median of a set of values, 0 when empty
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Split the lines of one region into paragraphs
///
/// `formula_lines[i]` marks formula lines, which always stand alone. With a
/// `short_line_width`, narrower lines are isolated as well: the paragraph is
/// broken before and after them.
pub fn split_paragraphs(
    lines: &[Line],
    formula_lines: &[bool],
    short_line_width: Option<f32>,
) -> Vec<Vec<usize>> {
    let heights: Vec<f32> = lines.iter().map(Line::height).collect();
    let line_height = median(&heights);

    let mut paragraphs: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut left_edge = 0.0f32;
    let mut break_after = false;

    for (i, line) in lines.iter().enumerate() {
        let is_formula = formula_lines.get(i).copied().unwrap_or(false);
        let is_short = short_line_width.is_some_and(|width| line.width() < width);

        let starts_new = match current.last() {
            None => true,
            Some(&last) => {
                let previous = &lines[last];
                let gap = line.bbox.y0 - previous.bbox.y1;
                break_after
                    || is_formula
                    || is_short
                    || gap > PARAGRAPH_GAP_FACTOR * line_height
                    || line.bbox.x0 - left_edge > INDENT_FACTOR * line.font_size
            }
        };

        if starts_new && !current.is_empty() {
            paragraphs.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            left_edge = line.bbox.x0;
        } else {
            left_edge = left_edge.min(line.bbox.x0);
        }
        current.push(i);
        break_after = is_formula || is_short;
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

/// Join the texts of consecutive lines, merging words hyphenated across lines
pub fn join_lines(previous: &mut String, next: &str) {
    let next = next.trim_start();
    if next.is_empty() {
        return;
    }
    if previous.is_empty() {
        previous.push_str(next);
        return;
    }

    let left = previous.trim_end();
    let hyphenated = left.ends_with('-')
        && left
            .trim_end_matches('-')
            .chars()
            .last()
            .is_some_and(|c| c.is_alphabetic())
        && next.chars().next().is_some_and(|c| c.is_lowercase());

    if hyphenated {
        let keep = left.trim_end_matches('-').len();
        previous.truncate(keep);
    } else {
        let keep = left.len();
        previous.truncate(keep);
        if !ends_with_cjk(previous) || !starts_with_cjk(next) {
            previous.push(' ');
        }
    }
    previous.push_str(next);
}

/// Whether a character is written without spaces between words
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3040..=0x30FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xAC00..=0xD7AF
        | 0xF900..=0xFAFF
        | 0xFF00..=0xFFEF
        | 0x3000..=0x303F)
}

fn ends_with_cjk(text: &str) -> bool {
    text.chars().last().is_some_and(is_cjk)
}

fn starts_with_cjk(text: &str) -> bool {
    text.chars().next().is_some_and(is_cjk)
}
