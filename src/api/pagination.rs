//! Page/limit pagination for list endpoints.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// Clamp raw query values: page >= 1, 1 <= limit <= MAX_PAGE_SIZE
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    pub fn limit(&self) -> i64 {
        self.limit as i64
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total: i64) -> Self {
        let limit = pagination.limit as i64;
        let total_pages = if total <= 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            data,
            pagination: PageInfo {
                page: pagination.page,
                limit: pagination.limit,
                total,
                total_pages,
                has_next: (pagination.page as i64) < total_pages,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        assert_eq!(Pagination::new(None, None), Pagination { page: 1, limit: 20 });
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, limit: 1 });
        assert_eq!(Pagination::new(Some(3), Some(500)).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_offset() {
        assert_eq!(Pagination::new(Some(1), Some(20)).offset(), 0);
        assert_eq!(Pagination::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn test_page_info() {
        let page = Paginated::new(vec![1, 2], Pagination::new(Some(2), Some(2)), 5);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next);

        let last = Paginated::new(vec![5], Pagination::new(Some(3), Some(2)), 5);
        assert!(!last.pagination.has_next);

        let empty: Paginated<u8> = Paginated::new(vec![], Pagination::new(None, None), 0);
        assert_eq!(empty.pagination.total_pages, 0);
        assert!(!empty.pagination.has_next);
    }
}
