/// Page/per-page query helpers
///
/// List endpoints accept `?page=N&per_page=M` (1-based pages, `per_page` in
/// `1..=100`, default 20) and answer with a [`Page`] envelope.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Raw pagination query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Validated pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaginationError {
    #[error("page must be at least 1")]
    InvalidPage,

    #[error("per_page must be between 1 and {MAX_PER_PAGE}")]
    InvalidPerPage,
}

impl PageParams {
    pub fn validate(&self) -> Result<Pagination, PaginationError> {
        let page = self.page.unwrap_or(1);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE);

        if page == 0 {
            return Err(PaginationError::InvalidPage);
        }
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(PaginationError::InvalidPerPage);
        }

        Ok(Pagination { page, per_page })
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    /// SQL LIMIT
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    /// SQL OFFSET
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: i64) -> Self {
        Self {
            items,
            page: pagination.page,
            per_page: pagination.per_page,
            total,
        }
    }

    pub fn total_pages(&self) -> i64 {
        let per_page = i64::from(self.per_page.max(1));
        (self.total + per_page - 1) / per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = PageParams::default().validate().unwrap();
        assert_eq!(p, Pagination { page: 1, per_page: 20 });
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), 20);
    }

    #[test]
    fn test_offset() {
        let p = PageParams { page: Some(3), per_page: Some(25) }.validate().unwrap();
        assert_eq!(p.offset(), 50);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(
            PageParams { page: Some(0), per_page: None }.validate(),
            Err(PaginationError::InvalidPage)
        );
        assert_eq!(
            PageParams { page: None, per_page: Some(0) }.validate(),
            Err(PaginationError::InvalidPerPage)
        );
        assert_eq!(
            PageParams { page: None, per_page: Some(101) }.validate(),
            Err(PaginationError::InvalidPerPage)
        );
        assert!(PageParams { page: None, per_page: Some(100) }.validate().is_ok());
    }

    #[test]
    fn test_total_pages() {
        let page: Page<u8> = Page::new(vec![], Pagination { page: 1, per_page: 20 }, 41);
        assert_eq!(page.total_pages(), 3);
        let empty: Page<u8> = Page::new(vec![], Pagination::default(), 0);
        assert_eq!(empty.total_pages(), 0);
    }
}
