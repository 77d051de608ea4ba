use regex::Regex;

use crate::document::Glyph;
use crate::errors::PipelineError;

/// Font names of TeX math, symbol, monospace and italic faces
pub const DEFAULT_FONT_PATTERN: &str = r"(CM[^R]|MS.M|XY|MT|BL|RM|EU|LA|RS|LINE|LCIRCLE|TeX-|rsfs|txsy|wasy|stmary|.*Mono|.*Code|.*Ital|.*Sym|.*Math)";

/// Math symbols, modifier letters and symbols, combining marks and Greek
pub const DEFAULT_CHAR_PATTERN: &str = r"[\p{Sm}\p{Lm}\p{Sk}\p{Mn}\x{0370}-\x{03FF}]";

/// Decides whether a glyph belongs to a formula
#[derive(Debug, Clone)]
pub struct FormulaDetector {
    font: Regex,
    chars: Regex,
}

fn compile(pattern: &str, what: &str) -> Result<Regex, PipelineError> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
        PipelineError::Configuration(format!("Invalid formula {} pattern '{}': {}", what, pattern, e))
    })
}

impl FormulaDetector {
    /// Build a detector, using the defaults for absent patterns
    pub fn new(font_pattern: Option<&str>, char_pattern: Option<&str>) -> Result<Self, PipelineError> {
        Ok(Self {
            font: compile(font_pattern.unwrap_or(DEFAULT_FONT_PATTERN), "font")?,
            chars: compile(char_pattern.unwrap_or(DEFAULT_CHAR_PATTERN), "character")?,
        })
    }

    /// Whether a font name is a formula font; subset tags (`ABCDEF+`) are ignored
    pub fn is_formula_font(&self, font: &str) -> bool {
        let name = font.rsplit('+').next().unwrap_or(font);
        self.font.is_match(name)
    }

    /// Whether a glyph is a formula glyph by font or by character class
    pub fn is_formula_glyph(&self, glyph: &Glyph) -> bool {
        if glyph.text.trim().is_empty() {
            return false;
        }
        self.is_formula_font(&glyph.font) || self.chars.is_match(&glyph.text)
    }
}

impl Default for FormulaDetector {
    fn default() -> Self {
        Self {
            font: Regex::new(&format!("^(?:{})", DEFAULT_FONT_PATTERN))
                .expect("default font pattern is valid"),
            chars: Regex::new(&format!("^(?:{})", DEFAULT_CHAR_PATTERN))
                .expect("default character pattern is valid"),
        }
    }
}
