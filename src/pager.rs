//! Bounded, ellipsis-aware page window computation for the pager UI.

/// One renderable pager entry: a concrete 0-based page number or an
/// ellipsis placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEntry {
    Page(u32),
    Ellipsis,
}

/// Default number of visible slots in the pager.
pub const MAX_VISIBLE: u32 = 7;

/// Compute the window of page buttons for `current` out of `total` pages.
///
/// `total == 0` (the published error-page shape) renders no pager at all;
/// for any `total >= 1` the window always contains the first and last page.
pub fn page_window(current: u32, total: u32) -> Vec<PageEntry> {
    page_window_with(current, total, MAX_VISIBLE)
}

pub fn page_window_with(current: u32, total: u32, max_visible: u32) -> Vec<PageEntry> {
    debug_assert!(max_visible >= 5, "window too small to hold both anchors");
    if total == 0 {
        return Vec::new();
    }
    if total <= max_visible {
        return (0..total).map(PageEntry::Page).collect();
    }
    let current = current.min(total - 1);

    if current <= 3 {
        // Leading run, no leading ellipsis.
        let mut window: Vec<PageEntry> = (0..=max_visible - 2).map(PageEntry::Page).collect();
        window.push(PageEntry::Ellipsis);
        window.push(PageEntry::Page(total - 1));
        window
    } else if current + 4 >= total {
        // Trailing run, no trailing ellipsis.
        let mut window = vec![PageEntry::Page(0), PageEntry::Ellipsis];
        window.extend((total - (max_visible - 1)..total).map(PageEntry::Page));
        window
    } else {
        vec![
            PageEntry::Page(0),
            PageEntry::Ellipsis,
            PageEntry::Page(current - 1),
            PageEntry::Page(current),
            PageEntry::Page(current + 1),
            PageEntry::Ellipsis,
            PageEntry::Page(total - 1),
        ]
    }
}

/// `previous`/`first` are no-ops on the first page.
pub fn can_prev(current: u32) -> bool {
    current > 0
}

/// `next`/`last` are no-ops on the last page (and when there are no pages).
pub fn can_next(current: u32, total: u32) -> bool {
    total > 0 && current + 1 < total
}
