use scraper::{ElementRef, Html, Selector};

/// Element text with whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match under `element`, if non-empty.
pub(crate) fn select_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Highest page number among the pagination links.
pub(crate) fn last_page_number(document: &Html, selector: &Selector) -> Option<u32> {
    document
        .select(selector)
        .filter_map(|el| element_text(el).parse::<u32>().ok())
        .max()
}

/// Whether any of `selectors` matches somewhere in the document. Used to
/// tell an empty listing from a page whose layout is no longer understood.
pub(crate) fn has_any(document: &Html, selectors: &[&Selector]) -> bool {
    selectors
        .iter()
        .any(|selector| document.select(selector).next().is_some())
}

pub(crate) fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

/// Resolves `href` against the page URL; falls back to `href` as given.
pub(crate) fn absolute_url(page_url: &str, href: &str) -> String {
    reqwest::Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .unwrap_or_else(|_| href.to_string())
}
