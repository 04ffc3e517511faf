//! Page-number window for paged views.

/// Page numbers to render for `page` of `total`, plus the previous and
/// next page. `0` in the list stands for an ellipsis.
///
/// `page` is clamped into `1..=total`. Fewer than two pages renders no
/// pager at all.
pub fn get_paging_range(page: u32, total: u32) -> (Vec<u32>, u32, u32) {
    if total < 2 {
        return (Vec::new(), 0, 0);
    }
    let page = page.clamp(1, total);
    let prev = page.saturating_sub(1).max(1);
    let next = (page + 1).min(total);

    let mut range = Vec::with_capacity(8);
    if total < 6 {
        range.extend(1..=total);
        return (range, prev, next);
    }

    range.push(1);
    if page > 3 {
        range.push(0);
    }
    if prev == 1 {
        if page == 1 {
            range.extend_from_slice(&[next, next + 1, next + 2]);
        } else {
            range.extend_from_slice(&[page, next, next + 1]);
        }
    } else if next == total {
        if page == total {
            range.extend_from_slice(&[prev - 2, prev - 1, prev]);
        } else {
            range.extend_from_slice(&[prev - 1, prev, page]);
        }
    } else {
        range.extend_from_slice(&[prev, page, next]);
    }
    if page + 3 <= total {
        range.push(0);
    }
    range.push(total);
    (range, prev, next)
}
