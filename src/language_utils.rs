//! Language utilities for the `--lang-in` / `--lang-out` options.
//!
//! Accepts ISO 639-1 (2-letter) and ISO 639-2 (3-letter, T or B) codes, plus
//! a few regional tags commonly used by translation engines.

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes that differ from their 639-2/T counterpart
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Regional tags accepted on top of plain ISO codes
const REGIONAL_TAGS: &[(&str, &str)] = &[
    ("zh-cn", "zh"),
    ("zh-tw", "zh"),
    ("zh-hans", "zh"),
    ("zh-hant", "zh"),
    ("pt-br", "pt"),
    ("en-us", "en"),
    ("en-gb", "en"),
];

fn resolve(code: &str) -> Option<Language> {
    let normalized = code.trim().to_lowercase();
    let base = REGIONAL_TAGS
        .iter()
        .find(|(tag, _)| *tag == normalized)
        .map(|(_, base)| base.to_string())
        .unwrap_or(normalized);

    match base.len() {
        2 => Language::from_639_1(&base),
        3 => {
            let part2t = PART2B_TO_PART2T
                .iter()
                .find(|(b, _)| *b == base)
                .map(|(_, t)| *t)
                .unwrap_or(base.as_str());
            Language::from_639_3(part2t)
        }
        _ => None,
    }
}

/// Validate a language code, returning an error naming the bad code
pub fn validate_language_code(code: &str) -> Result<()> {
    resolve(code)
        .map(|_| ())
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-1 where one exists, ISO 639-3 otherwise
pub fn normalize_language_code(code: &str) -> Result<String> {
    let lang = resolve(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang
        .to_639_1()
        .map(|c| c.to_string())
        .unwrap_or_else(|| lang.to_639_3().to_string()))
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (resolve(code1), resolve(code2)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// English name of a language, used in backend prompts
pub fn get_language_name(code: &str) -> Result<String> {
    let lang = resolve(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang.to_name().to_string())
}
