//! Listing pager component

use crate::schema::{ComputedField, ExtractionRule, SchemaRegistry, TransformStep, TypeDef};
use crate::value::{Record, Value};

pub const PAGER: &str = "Pager";

const PAGE_TEXT: &str = ".//li[@class='btn__pager__current']/text()";
const PAGE_PATTERN: &str = r"Page (?<current>\d+) of (?<total>\d+)";

pub fn register(registry: &mut SchemaRegistry) {
    registry.register(
        TypeDef::new(PAGER)
            .rule(ExtractionRule::new("pageText", PAGE_TEXT))
            .rule(ExtractionRule::new("currentPage", PAGE_TEXT))
            .rule(ExtractionRule::new("totalPages", PAGE_TEXT))
            .rule(ExtractionRule::new(
                "firstPageUrl",
                ".//a[contains(@class, 'btn__pager__prev--all')]/@href",
            ))
            .rule(ExtractionRule::new(
                "previousPageUrl",
                ".//a[contains(@class, 'btn__pager__prev')]/@href",
            ))
            .rule(ExtractionRule::new(
                "nextPageUrl",
                ".//a[contains(@class, 'btn__pager__next')]/@href",
            ))
            .rule(ExtractionRule::new(
                "lastPageUrl",
                ".//a[contains(@class, 'btn__pager__next--all')]/@href",
            ))
            .transform(
                "currentPage",
                TransformStep::new()
                    .extract_regex(PAGE_PATTERN)
                    .capture_named("current")
                    .parse_number(),
            )
            .transform(
                "totalPages",
                TransformStep::new()
                    .extract_regex(PAGE_PATTERN)
                    .capture_named("total")
                    .parse_number(),
            )
            .computed(ComputedField::new("hasNextPage", |pager| {
                Value::Bool(PagerView::new(Some(pager)).has_next_page())
            })),
    );
}

/// Pagination state of a page record's `_pager` field
///
/// A page without a pager reads as page 1 of 1.
#[derive(Debug, Clone, Copy)]
pub struct PagerView<'a> {
    pager: Option<&'a Record>,
}

impl<'a> PagerView<'a> {
    pub fn new(pager: Option<&'a Record>) -> Self {
        Self { pager }
    }

    /// Pager of a page record
    pub fn of(page: &'a Record) -> Self {
        Self::new(page.record("_pager"))
    }

    fn page_number(&self, field: &str) -> u32 {
        self.pager
            .and_then(|p| p.number(field))
            .filter(|n| n.is_finite() && *n >= 1.0)
            .map(|n| n as u32)
            .unwrap_or(1)
    }

    pub fn current_page(&self) -> u32 {
        self.page_number("currentPage")
    }

    pub fn total_pages(&self) -> u32 {
        self.page_number("totalPages")
    }

    pub fn has_next_page(&self) -> bool {
        self.current_page() < self.total_pages()
    }

    pub fn next_page_url(&self) -> Option<String> {
        if !self.has_next_page() {
            return None;
        }
        self.pager
            .and_then(|p| p.str("nextPageUrl"))
            .map(String::from)
    }

    /// `{currentPage, totalPages, nextPageUrl}` summary exposed on page records
    pub fn to_value(&self) -> Value {
        Value::from(
            Record::new("Pagination")
                .with("currentPage", self.current_page() as i64)
                .with("totalPages", self.total_pages() as i64)
                .with("nextPageUrl", self.next_page_url()),
        )
    }
}

/// Computed `pagination` field for page types carrying a `_pager`
pub fn pagination_field() -> ComputedField {
    ComputedField::new("pagination", |page| PagerView::of(page).to_value())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::Extractor;

    const PAGER_HTML: &str = r#"
        <ul class="btn__pager">
            <li><a href="/member/?page=1" class="btn__pager__prev--all js__tooltip"></a></li>
            <li><a href="/member/?page=1" class="btn__pager__prev js__tooltip"></a></li>
            <li class="btn__pager__current">Page 2 of 4</li>
            <li><a href="/member/?page=3" class="btn__pager__next js__tooltip"></a></li>
            <li><a href="/member/?page=4" class="btn__pager__next--all js__tooltip"></a></li>
        </ul>
    "#;

    fn extract(html: &str) -> Record {
        let mut registry = SchemaRegistry::new();
        register(&mut registry);
        registry.register(
            TypeDef::new("Page")
                .rule(ExtractionRule::new("_pager", "//ul[@class='btn__pager']").schema(PAGER))
                .computed(pagination_field()),
        );
        Extractor::new(Arc::new(registry))
            .load_from_str(html, "Page")
            .unwrap()
    }

    #[test]
    fn test_pager_fields() {
        let page = extract(PAGER_HTML);
        let pager = page.record("_pager").unwrap();
        assert_eq!(pager.str("pageText"), Some("Page 2 of 4"));
        assert_eq!(pager.number("currentPage"), Some(2.0));
        assert_eq!(pager.number("totalPages"), Some(4.0));
        assert_eq!(pager.str("firstPageUrl"), Some("/member/?page=1"));
        assert_eq!(pager.str("lastPageUrl"), Some("/member/?page=4"));

        let view = PagerView::of(&page);
        assert!(view.has_next_page());
        assert_eq!(view.next_page_url().as_deref(), Some("/member/?page=3"));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let page = extract(&PAGER_HTML.replace("Page 2 of 4", "Page 4 of 4"));
        let view = PagerView::of(&page);
        assert_eq!(view.current_page(), 4);
        assert!(!view.has_next_page());
        assert_eq!(view.next_page_url(), None);
    }

    #[test]
    fn test_missing_pager_is_single_page() {
        let page = extract("<p>no pager</p>");
        let view = PagerView::of(&page);
        assert_eq!((view.current_page(), view.total_pages()), (1, 1));
        assert_eq!(view.next_page_url(), None);
    }

    #[test]
    fn test_unparseable_text_defaults_to_one() {
        let page = extract(&PAGER_HTML.replace("Page 2 of 4", "Seite 2 von 4"));
        let pager = page.record("_pager").unwrap();
        assert!(pager.get("currentPage").is_null());
        assert_eq!(PagerView::of(&page).total_pages(), 1);
    }
}
