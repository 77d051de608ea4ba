use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::FormulaRun;
use crate::extraction::paragraph::is_cjk;

/// Output font when the source font is not inherited
pub const DEFAULT_FONT: &str = "Helvetica";

/// Baseline-to-baseline distance relative to the font size
pub const LINE_SPACING: f32 = 1.2;

/// Font shrink step, in percent of the original size
pub const SHRINK_STEP_PERCENT: u32 = 5;

/// Smallest font size, in percent of the original size
pub const MIN_SCALE_PERCENT: u32 = 60;

pub const ELLIPSIS: &str = "…";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{v\d+\}").expect("placeholder pattern is valid"));

/// Estimated advance width of a character
pub fn char_width(c: char, size: f32) -> f32 {
    if is_cjk(c) {
        size
    } else if c.is_whitespace() {
        size * 0.25
    } else if c.is_ascii_uppercase() || matches!(c, 'm' | 'w' | 'M' | 'W' | '@') {
        size * 0.65
    } else if matches!(c, 'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '!' | '|') {
        size * 0.28
    } else {
        size * 0.5
    }
}

/// Estimated width of a text
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(|c| char_width(c, size)).sum()
}

/// Smallest breakable unit of a translation
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    /// Font of an inline formula, `None` for translated text
    pub font: Option<String>,
    /// Whether a space separates this token from the previous one
    pub space_before: bool,
}

impl Token {
    fn width(&self, size: f32) -> f32 {
        text_width(&self.text, size)
    }
}

/// Split a translation into words, single CJK characters and formulas
///
/// Placeholders are replaced by the formula they stand for; unknown
/// placeholders stay as literal text.
pub fn tokenize(text: &str, formulas: &[FormulaRun]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pending_space = false;
    let mut last = 0;

    for found in PLACEHOLDER_RE.find_iter(text) {
        push_words(&text[last..found.start()], &mut tokens, &mut pending_space);
        match formulas.iter().find(|f| f.placeholder == found.as_str()) {
            Some(formula) => {
                tokens.push(Token {
                    text: formula.text.clone(),
                    font: Some(formula.font.clone()),
                    space_before: pending_space,
                });
                pending_space = false;
            }
            None => push_words(found.as_str(), &mut tokens, &mut pending_space),
        }
        last = found.end();
    }
    push_words(&text[last..], &mut tokens, &mut pending_space);
    tokens
}

fn flush_word(word: &mut String, tokens: &mut Vec<Token>, pending_space: &mut bool) {
    if !word.is_empty() {
        tokens.push(Token {
            text: std::mem::take(word),
            font: None,
            space_before: *pending_space,
        });
        *pending_space = false;
    }
}

fn push_words(text: &str, tokens: &mut Vec<Token>, pending_space: &mut bool) {
    let mut word = String::new();
    for c in text.chars() {
        if c.is_whitespace() {
            flush_word(&mut word, tokens, pending_space);
            *pending_space = !tokens.is_empty();
        } else if is_cjk(c) {
            flush_word(&mut word, tokens, pending_space);
            word.push(c);
            flush_word(&mut word, tokens, pending_space);
        } else {
            word.push(c);
        }
    }
    flush_word(&mut word, tokens, pending_space);
}

/// Greedy line breaking of tokens into a width
///
/// A token wider than the line gets a line of its own.
pub fn wrap(tokens: &[Token], width: f32, size: f32) -> Vec<Vec<Token>> {
    let space = char_width(' ', size);
    let mut lines: Vec<Vec<Token>> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut current_width = 0.0f32;

    for token in tokens {
        let token_width = token.width(size);
        let gap = if token.space_before && !current.is_empty() { space } else { 0.0 };
        if !current.is_empty() && current_width + gap + token_width > width {
            lines.push(std::mem::take(&mut current));
            let mut token = token.clone();
            token.space_before = false;
            current_width = token_width;
            current.push(token);
            continue;
        }
        current_width += gap + token_width;
        current.push(token.clone());
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Height taken by `lines` lines at a font size
pub fn block_height(lines: usize, size: f32) -> f32 {
    if lines == 0 {
        return 0.0;
    }
    size + (lines - 1) as f32 * size * LINE_SPACING
}

/// Result of fitting a translation into its anchor
#[derive(Debug, Clone, PartialEq)]
pub struct Fitted {
    pub lines: Vec<Vec<Token>>,
    pub font_size: f32,
    /// Trailing lines were cut off
    pub truncated: bool,
}

/// Fit tokens into a box, shrinking the font and truncating as needed
pub fn fit(tokens: &[Token], width: f32, height: f32, size: f32) -> Fitted {
    let tolerance = size * 0.1;
    let mut percent = 100;

    loop {
        let scaled = size * percent as f32 / 100.0;
        let lines = wrap(tokens, width, scaled);
        if block_height(lines.len(), scaled) <= height + tolerance {
            return Fitted {
                lines,
                font_size: scaled,
                truncated: false,
            };
        }
        if percent <= MIN_SCALE_PERCENT {
            return truncate(lines, width, height + tolerance, scaled);
        }
        percent -= SHRINK_STEP_PERCENT;
    }
}

fn truncate(mut lines: Vec<Vec<Token>>, width: f32, height: f32, size: f32) -> Fitted {
    let mut keep = 1;
    while keep < lines.len() && block_height(keep + 1, size) <= height {
        keep += 1;
    }
    lines.truncate(keep);

    if let Some(last) = lines.last_mut() {
        let ellipsis_width = text_width(ELLIPSIS, size);
        let line_width = |line: &[Token]| -> f32 {
            line.iter()
                .enumerate()
                .map(|(i, t)| {
                    let gap = if i > 0 && t.space_before { char_width(' ', size) } else { 0.0 };
                    gap + t.width(size)
                })
                .sum()
        };
        while last.len() > 1 && line_width(last) + ellipsis_width > width {
            last.pop();
        }
        last.push(Token {
            text: ELLIPSIS.to_string(),
            font: None,
            space_before: false,
        });
    }

    Fitted {
        lines,
        font_size: size,
        truncated: true,
    }
}
