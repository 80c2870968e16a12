use serde::Serialize;

/// The largest page size a caller may request.
pub const MAX_LIMIT: u32 = 100;

/// A resolved page request: 1-based page number plus page size.
#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Resolves raw query parameters against a default page size. A zero
    /// or missing page falls back to 1; a zero limit falls back to the
    /// default, and an oversized one is capped at [`MAX_LIMIT`].
    pub fn resolve(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p,
            _ => 1,
        };
        let limit = match limit {
            Some(l) if l >= 1 => l.min(MAX_LIMIT),
            _ => default_limit,
        };

        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

/// Pagination metadata returned alongside every listing.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

impl Pagination {
    pub fn new(request: PageRequest, total_count: i64) -> Self {
        let limit = i64::from(request.limit);
        let total_pages = ((total_count + limit - 1) / limit).max(0) as u32;

        Self {
            current_page: request.page,
            total_pages,
            total_count,
            has_next_page: request.page < total_pages,
            has_prev_page: request.page > 1,
        }
    }
}
