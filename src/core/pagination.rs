//! Page selection that never fails on bad input.
//!
//! A page request that is not an integer yields the first page; a request
//! outside `1..=num_pages` yields the last page. An empty collection still
//! has one (empty) page.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

pub fn num_pages(count: usize, per_page: usize) -> usize {
    count.div_ceil(per_page.max(1)).max(1)
}

/// Resolve a raw page request; a missing request means page 1.
pub fn page_number(requested: Option<&str>, num_pages: usize) -> usize {
    let raw = requested.map(str::trim).unwrap_or("1");
    match raw.parse::<i64>() {
        Ok(n) if n >= 1 && (n as usize) <= num_pages => n as usize,
        Ok(_) => num_pages,
        Err(_) => 1,
    }
}

pub fn paginate<T: Clone>(items: &[T], per_page: usize, requested: Option<&str>) -> Page<T> {
    let per_page = per_page.max(1);
    let num_pages = num_pages(items.len(), per_page);
    let number = page_number(requested, num_pages);

    let start = (number - 1) * per_page;
    let end = (start + per_page).min(items.len());
    Page {
        number,
        num_pages,
        count: items.len(),
        items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<u32> {
        (1..=25).collect()
    }

    #[test]
    fn non_integer_request_returns_first_page() {
        let page = paginate(&items(), 10, Some("abc"));
        assert_eq!(page.number, 1);
        assert_eq!(page.items, (1..=10).collect::<Vec<_>>());
        assert_eq!(paginate(&items(), 10, Some("2.5")).number, 1);
    }

    #[test]
    fn out_of_range_request_returns_last_page() {
        let page = paginate(&items(), 10, Some("99"));
        assert_eq!(page.number, 3);
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert!(!page.has_next());
        assert_eq!(paginate(&items(), 10, Some("0")).number, 3);
    }

    #[test]
    fn missing_request_is_page_one() {
        let page = paginate(&items(), 10, None);
        assert_eq!(page.number, 1);
        assert!(page.has_next());
        assert!(!page.has_previous());
    }

    #[test]
    fn empty_collection_has_one_empty_page() {
        let page = paginate::<u32>(&[], 10, Some("4"));
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert!(page.items.is_empty());
    }
}
