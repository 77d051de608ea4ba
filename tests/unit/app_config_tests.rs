/*!
 * Tests for configuration loading and validation
 */

use pdfbabel::app_config::{Config, LogLevel, TranslationProvider};
use pdfbabel::errors::PipelineError;

use crate::common::create_temp_dir;

fn valid_config() -> Config {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::LMStudio;
    config
}

#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("pdfbabel.json");

    let (config, created) = Config::load_or_create(&path).unwrap();
    assert!(created);
    assert!(path.exists());
    assert_eq!(config.target_language, "zh");
    assert_eq!(config.translation.qps, 4.0);
    assert_eq!(config.pipeline.report_interval_secs, 0.1);

    let (reloaded, created) = Config::load_or_create(&path).unwrap();
    assert!(!created);
    assert_eq!(reloaded.target_language, config.target_language);
}

#[test]
fn test_loadOrCreate_withPartialFile_shouldFillDefaults() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("partial.json");
    std::fs::write(
        &path,
        r#"{"target_language": "fr", "output": {"no_dual": true}, "log_level": "debug"}"#,
    )
    .unwrap();

    let (config, created) = Config::load_or_create(&path).unwrap();
    assert!(!created);
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.source_language, "en");
    assert!(config.output.no_dual);
    assert!(!config.output.no_mono);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.extraction.short_line_split_factor, 0.8);
}

#[test]
fn test_loadOrCreate_withInvalidJson_shouldFail() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Config::load_or_create(&path).is_err());
}

#[test]
fn test_applyCompatibility_shouldEnableThreeOptions() {
    let mut config = valid_config();
    config.output.enhance_compatibility = true;
    config.apply_compatibility();

    assert!(config.output.skip_clean);
    assert!(config.output.dual_translate_first);
    assert!(config.output.disable_rich_text_translate);
    assert!(!config.rich_text());
}

#[test]
fn test_validate_withDefaultsForLocalProvider_shouldPass() {
    assert!(valid_config().validate().is_ok());
}

#[test]
fn test_validate_withInvalidValues_shouldReturnConfigurationError() {
    let cases: Vec<Box<dyn Fn(&mut Config)>> = vec![
        Box::new(|c| c.target_language = "klingon-ish".to_string()),
        Box::new(|c| c.translation.qps = 0.0),
        Box::new(|c| c.translation.retry_count = 0),
        Box::new(|c| c.pipeline.page_workers = 0),
        Box::new(|c| c.extraction.short_line_split_factor = 1.5),
        Box::new(|c| c.extraction.formula_font_pattern = Some("(unclosed".to_string())),
        Box::new(|c| c.pages = Some("4-2".to_string())),
        Box::new(|c| c.translation.endpoint = Some("not a url".to_string())),
    ];

    for (index, mutate) in cases.iter().enumerate() {
        let mut config = valid_config();
        mutate(&mut config);
        assert!(
            matches!(config.validate(), Err(PipelineError::Configuration(_))),
            "case {} should be rejected",
            index
        );
    }
}

#[test]
fn test_getEndpoint_shouldDependOnProvider() {
    let mut config = valid_config();
    assert_eq!(config.translation.get_endpoint(), "http://localhost:1234/v1");

    config.translation.endpoint = Some("http://gpu-box:8080/v1/".to_string());
    assert_eq!(config.translation.get_endpoint(), "http://gpu-box:8080/v1");
}
