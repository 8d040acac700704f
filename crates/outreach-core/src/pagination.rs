use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(size) => size,
    None => unreachable!(),
};

#[must_use]
pub fn page_count(total: usize, page_size: NonZeroUsize) -> usize {
    total.div_ceil(page_size.get()).max(1)
}

#[must_use]
pub fn clamp_page(page: usize, total: usize, page_size: NonZeroUsize) -> usize {
    page.clamp(1, page_count(total, page_size))
}

/// Bounds of one page over a view of `total` items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct PageWindow {
    pub page: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub start: usize,
    pub end: usize,
    pub total: usize,
}

impl PageWindow {
    #[must_use]
    pub fn compute(page: usize, total: usize, page_size: NonZeroUsize) -> Self {
        let page = clamp_page(page, total, page_size);
        let start = ((page - 1) * page_size.get()).min(total);
        let end = (start + page_size.get()).min(total);
        Self { page, page_count: page_count(total, page_size), page_size: page_size.get(), start, end, total }
    }

    /// The visible part of `items`, which should be the view the window was computed over.
    #[must_use]
    pub fn slice<'v, T>(&self, items: &'v [T]) -> &'v [T] {
        let end = self.end.min(items.len());
        let start = self.start.min(end);
        &items[start..end]
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }
}

/// Page cursor over a filtered view. The cursor itself holds no view state;
/// every read clamps against the current view length.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Paginator {
    page_size: NonZeroUsize,
    current_page: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Paginator {
    #[must_use]
    pub fn new(page_size: NonZeroUsize) -> Self {
        Self { page_size, current_page: 1 }
    }

    #[must_use]
    pub fn page_size(&self) -> NonZeroUsize {
        self.page_size
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn reset(&mut self) {
        self.current_page = 1;
    }

    /// Move to `page`, clamped into `[1, page_count]` for a view of `total` items.
    pub fn go_to(&mut self, page: usize, total: usize) -> PageWindow {
        self.current_page = clamp_page(page, total, self.page_size);
        self.window(total)
    }

    #[must_use]
    pub fn window(&self, total: usize) -> PageWindow {
        PageWindow::compute(self.current_page, total, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn size(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    #[test]
    fn empty_view_has_one_page() {
        let window = PageWindow::compute(1, 0, size(10));
        assert_eq!(window.page_count, 1);
        assert_eq!((window.start, window.end), (0, 0));
        assert!(!window.has_next());
        assert!(!window.has_previous());
    }

    #[test]
    fn last_page_is_partial() {
        let items = (0..23).collect::<Vec<_>>();
        let window = PageWindow::compute(3, items.len(), size(10));
        assert_eq!(window.page_count, 3);
        assert_eq!(window.slice(&items), &[20, 21, 22]);
    }

    #[test]
    fn navigation_clamps_instead_of_failing() {
        let mut pager = Paginator::new(size(10));
        assert_eq!(pager.go_to(0, 25).page, 1);
        assert_eq!(pager.go_to(99, 25).page, 3);
        assert_eq!(pager.current_page(), 3);
        pager.reset();
        assert_eq!(pager.current_page(), 1);
    }

    #[test]
    fn window_reclamps_after_view_shrinks() {
        let mut pager = Paginator::new(size(10));
        pager.go_to(3, 30);
        let window = pager.window(5);
        assert_eq!(window.page, 1);
        assert_eq!((window.start, window.end), (0, 5));
    }

    proptest! {
        #[test]
        fn property_page_count_and_clamp(page_size in 1_usize..50, total in 0_usize..500) {
            let page_size = size(page_size);
            let expected = std::cmp::max(1, total.div_ceil(page_size.get()));
            prop_assert_eq!(page_count(total, page_size), expected);

            let mut pager = Paginator::new(page_size);
            let window = pager.go_to(expected + 5, total);
            prop_assert_eq!(window.page, expected);
            prop_assert!(window.end - window.start <= page_size.get());
        }
    }
}
