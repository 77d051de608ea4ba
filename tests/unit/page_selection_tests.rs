/*!
 * Tests for page selection parsing and resolution
 */

use pdfbabel::document::PageSelection;
use pdfbabel::errors::PipelineError;

#[test]
fn test_resolve_withSinglesAndRange_shouldSelectListedPages() {
    let selection = PageSelection::parse("1,3-5").unwrap();
    assert_eq!(selection.resolve(8), vec![1, 3, 4, 5]);
}

#[test]
fn test_resolve_withOverlappingItems_shouldBeStrictlyIncreasing() {
    let selection: PageSelection = "1,2,1-,-3,3-5".parse().unwrap();
    let pages = selection.resolve(6);

    assert_eq!(pages, vec![1, 2, 3, 4, 5, 6]);
    assert!(pages.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_resolve_withPagesBeyondDocument_shouldClamp() {
    let selection = PageSelection::parse("2,7-9,-3").unwrap();
    let pages = selection.resolve(4);

    assert_eq!(pages, vec![1, 2, 3]);
    assert!(pages.iter().all(|p| (1..=4).contains(p)));
}

#[test]
fn test_resolve_withSelectionOutsideDocument_shouldBeEmpty() {
    let selection = PageSelection::parse("10-12").unwrap();
    assert!(selection.resolve(3).is_empty());
}

#[test]
fn test_all_shouldSelectEveryPage() {
    assert_eq!(PageSelection::all().resolve(3), vec![1, 2, 3]);
    assert!(PageSelection::default().resolve(0).is_empty());
}

#[test]
fn test_parse_withMalformedItems_shouldReturnConfigurationError() {
    for selection in ["", "a", "0", "5-2", "-", "1,,x"] {
        let result = PageSelection::parse(selection);
        assert!(
            matches!(result, Err(PipelineError::Configuration(_))),
            "'{}' should be rejected",
            selection
        );
    }
}
