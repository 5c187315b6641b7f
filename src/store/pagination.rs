use serde::{Deserialize, Serialize};

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn is_valid(&self) -> bool {
        self.page >= 1 && self.limit >= 1
    }

    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.limit as u64
    }
}

/// Metadata returned alongside a page of rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub next_page: u32,
    pub previous_page: u32,
}

impl PageInfo {
    pub fn new(request: PageRequest, total_items: u64) -> Self {
        let limit = request.limit.max(1) as u64;
        let total_pages = total_items.div_ceil(limit) as u32;
        let page = request.page.max(1);
        let has_next_page = page < total_pages;
        let has_previous_page = page > 1;
        Self {
            page,
            limit: request.limit,
            total_items,
            total_pages,
            has_next_page,
            has_previous_page,
            next_page: if has_next_page { page + 1 } else { page },
            previous_page: if has_previous_page { page - 1 } else { page },
        }
    }
}
