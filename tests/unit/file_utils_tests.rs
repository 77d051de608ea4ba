/*!
 * Tests for file and directory utilities
 */

use std::fs;
use std::path::PathBuf;

use pdfbabel::file_utils::{FileManager, OutputKind};

use crate::common::create_temp_dir;

#[test]
fn test_generateOutputPath_shouldEncodeLanguageAndKind() {
    let mono = FileManager::generate_output_path("/in/paper.pdf", "/out", "fr", OutputKind::Mono);
    let dual = FileManager::generate_output_path("/in/paper.il.json", "/out", "fr", OutputKind::Dual);

    assert_eq!(mono, PathBuf::from("/out/paper.fr.mono.pdf"));
    assert_eq!(dual, PathBuf::from("/out/paper.fr.dual.pdf"));
}

#[test]
fn test_intermediateLayerPath_withJsonInput_shouldKeepPath() {
    let path = FileManager::intermediate_layer_path("/docs/paper.il.json");
    assert_eq!(path, PathBuf::from("/docs/paper.il.json"));
}

#[test]
fn test_findDocuments_withPdfAndSidecar_shouldListPdfOnce() {
    let dir = create_temp_dir().unwrap();
    let nested = dir.path().join("nested");
    fs::create_dir_all(&nested).unwrap();

    fs::write(dir.path().join("a.pdf"), b"%PDF-1.5").unwrap();
    fs::write(dir.path().join("a.il.json"), "{}").unwrap();
    fs::write(nested.join("b.il.json"), "{}").unwrap();
    fs::write(dir.path().join("notes.txt"), "skip").unwrap();

    let documents = FileManager::find_documents(dir.path()).unwrap();

    assert_eq!(documents.len(), 2);
    assert!(documents.contains(&dir.path().join("a.pdf")));
    assert!(documents.contains(&nested.join("b.il.json")));
}

#[test]
fn test_ensureDir_withNestedPath_shouldCreateIt() {
    let dir = create_temp_dir().unwrap();
    let target = dir.path().join("x").join("y");

    FileManager::ensure_dir(&target).unwrap();
    assert!(target.is_dir());
    assert!(!FileManager::file_exists(&target));
}
