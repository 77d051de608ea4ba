use crate::errors::PipelineError;

/// One comma-separated item of a page selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageRange {
    Single(usize),
    /// Inclusive range, open on either side
    Span(Option<usize>, Option<usize>),
}

/// Parsed `--pages` value such as `"1,2,1-,-3,3-5"`
///
/// Pages are 1-indexed and ranges inclusive. Resolution against a page count
/// yields a strictly increasing, duplicate-free list within `[1, page_count]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    ranges: Vec<PageRange>,
}

fn parse_page_number(value: &str, item: &str) -> Result<usize, PipelineError> {
    let number: usize = value.trim().parse().map_err(|_| {
        PipelineError::Configuration(format!("Invalid page selection item '{}'", item))
    })?;
    if number == 0 {
        return Err(PipelineError::Configuration(format!(
            "Page numbers start at 1, got '{}'",
            item
        )));
    }
    Ok(number)
}

impl PageSelection {
    /// Select every page
    pub fn all() -> Self {
        Self {
            ranges: vec![PageRange::Span(None, None)],
        }
    }

    /// Parse a selection string
    pub fn parse(selection: &str) -> Result<Self, PipelineError> {
        let mut ranges = Vec::new();

        for item in selection.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }

            let range = match item.split_once('-') {
                None => PageRange::Single(parse_page_number(item, item)?),
                Some((start, end)) => {
                    let start = start.trim();
                    let end = end.trim();
                    if start.is_empty() && end.is_empty() {
                        return Err(PipelineError::Configuration(format!(
                            "Invalid page selection item '{}'",
                            item
                        )));
                    }
                    let start = (!start.is_empty())
                        .then(|| parse_page_number(start, item))
                        .transpose()?;
                    let end = (!end.is_empty())
                        .then(|| parse_page_number(end, item))
                        .transpose()?;
                    if let (Some(s), Some(e)) = (start, end) {
                        if s > e {
                            return Err(PipelineError::Configuration(format!(
                                "Page range '{}' is reversed",
                                item
                            )));
                        }
                    }
                    PageRange::Span(start, end)
                }
            };
            ranges.push(range);
        }

        if ranges.is_empty() {
            return Err(PipelineError::Configuration(
                "Page selection is empty".to_string(),
            ));
        }

        Ok(Self { ranges })
    }

    /// Resolve against a document with `page_count` pages
    pub fn resolve(&self, page_count: usize) -> Vec<usize> {
        let mut selected = vec![false; page_count + 1];

        for range in &self.ranges {
            let (start, end) = match *range {
                PageRange::Single(page) => (page, page),
                PageRange::Span(start, end) => {
                    (start.unwrap_or(1), end.unwrap_or(page_count))
                }
            };
            let end = end.min(page_count);
            for page in start.max(1)..=end {
                selected[page] = true;
            }
        }

        selected
            .iter()
            .enumerate()
            .filter_map(|(page, &hit)| hit.then_some(page))
            .collect()
    }
}

impl Default for PageSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl std::str::FromStr for PageSelection {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
