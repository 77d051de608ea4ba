use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// @module: File and directory utilities

/// Suffix of intermediate-layer files produced by the external PDF parser
pub const IL_SUFFIX: &str = ".il.json";

/// Directory name used under the user cache directory
const CACHE_DIRNAME: &str = "pdfbabel";

/// Kind of output artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Translated text only
    Mono,
    /// Original and translated pages
    Dual,
}

impl OutputKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Dual => "dual",
        }
    }
}

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {:?}", path))?;
        }
        Ok(())
    }

    /// Stem of an input document, with the intermediate-layer suffix removed
    pub fn document_stem<P: AsRef<Path>>(input_file: P) -> String {
        let name = input_file
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Some(stripped) = name.strip_suffix(IL_SUFFIX) {
            return stripped.to_string();
        }

        input_file
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or(name)
    }

    // @generates: Output path for a translated document
    // @params: input_file, output_dir, target_language, kind
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        target_language: &str,
        kind: OutputKind,
    ) -> PathBuf {
        let output_filename = format!(
            "{}.{}.{}.pdf",
            Self::document_stem(input_file),
            target_language,
            kind.suffix()
        );
        output_dir.as_ref().join(output_filename)
    }

    /// Intermediate-layer file for an input path
    ///
    /// A `.json` input is taken as is; a `.pdf` input is expected to have its
    /// parsed layer next to it as `<stem>.il.json`.
    pub fn intermediate_layer_path<P: AsRef<Path>>(input_file: P) -> PathBuf {
        let input_file = input_file.as_ref();
        let is_json = input_file
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            return input_file.to_path_buf();
        }

        let parent = input_file.parent().unwrap_or(Path::new(""));
        parent.join(format!("{}{}", Self::document_stem(input_file), IL_SUFFIX))
    }

    /// Whether a path looks like a translatable input
    pub fn is_document_file<P: AsRef<Path>>(path: P) -> bool {
        let path = path.as_ref();
        if !path.is_file() {
            return false;
        }
        let name = path.to_string_lossy().to_lowercase();
        name.ends_with(".pdf") || name.ends_with(IL_SUFFIX)
    }

    /// Find translatable documents below a directory, PDFs taking precedence
    /// over their own intermediate-layer sidecars
    pub fn find_documents<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if !Self::is_document_file(path) {
                continue;
            }

            let lower = path.to_string_lossy().to_lowercase();
            if lower.ends_with(IL_SUFFIX) {
                let pdf = path.with_file_name(format!("{}.pdf", Self::document_stem(path)));
                if pdf.is_file() {
                    continue;
                }
            }
            result.push(path.to_path_buf());
        }

        result.sort();
        Ok(result)
    }

    /// Default location of the persistent translation cache
    pub fn default_cache_path() -> Result<PathBuf> {
        let base_dir = dirs::cache_dir()
            .or_else(dirs::data_local_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))?;

        Ok(base_dir.join(CACHE_DIRNAME).join("translation_cache.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documentStem_withIlSuffix_shouldStripBoth() {
        assert_eq!(FileManager::document_stem("/tmp/paper.il.json"), "paper");
        assert_eq!(FileManager::document_stem("/tmp/paper.pdf"), "paper");
    }

    #[test]
    fn test_intermediateLayerPath_withPdf_shouldPointToSidecar() {
        let path = FileManager::intermediate_layer_path("/docs/paper.pdf");
        assert_eq!(path, PathBuf::from("/docs/paper.il.json"));
    }
}
