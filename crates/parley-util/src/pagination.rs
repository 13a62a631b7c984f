use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 25;
const MAX_LIMIT: u32 = 100;

/// Page/limit query shared by every listing endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self { page, limit }
    }

    pub fn page(&self) -> u32 {
        self.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE)
    }

    pub fn limit(&self) -> u32 {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() as i64 - 1) * self.limit() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total_data: u64,
    pub per_page: u32,
    pub total_page: u64,
    pub current_page: u32,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T: Serialize> {
    pub list: Vec<T>,
    pub pagination: Pagination,
}

/// Wrap a page of results. `prev_page` is only reported while more pages
/// remain after the current one.
pub fn paginate<T: Serialize>(
    list: Vec<T>,
    total_data: u64,
    page: u32,
    limit: u32,
) -> Paginated<T> {
    let per_page = limit.max(1);
    let total_page = total_data.div_ceil(per_page as u64);
    let current = page as u64;
    Paginated {
        list,
        pagination: Pagination {
            total_data,
            per_page,
            total_page,
            current_page: page,
            next_page: (current < total_page).then(|| page + 1),
            prev_page: (total_page > current && page > 1).then(|| page - 1),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_has_no_neighbours() {
        let page = paginate::<u8>(Vec::new(), 0, 1, 25);
        assert_eq!(page.pagination.total_page, 0);
        assert_eq!(page.pagination.current_page, 1);
        assert_eq!(page.pagination.next_page, None);
        assert_eq!(page.pagination.prev_page, None);
    }

    #[test]
    fn last_page_reports_no_prev_page() {
        let page = paginate(vec![1u8; 5], 30, 2, 25);
        assert_eq!(page.pagination.total_page, 2);
        assert_eq!(page.pagination.next_page, None);
        assert_eq!(page.pagination.prev_page, None);
    }

    #[test]
    fn middle_page_has_both_neighbours() {
        let page = paginate(vec![1u8; 10], 30, 2, 10);
        assert_eq!(page.pagination.total_page, 3);
        assert_eq!(page.pagination.next_page, Some(3));
        assert_eq!(page.pagination.prev_page, Some(1));
    }

    #[test]
    fn params_fall_back_to_defaults() {
        let params = PageParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), 25);
        assert_eq!(params.offset(), 0);

        let params = PageParams::new(Some(3), Some(10));
        assert_eq!(params.offset(), 20);

        let params = PageParams::new(Some(0), Some(0));
        assert_eq!(params.page(), 1);
        assert_eq!(params.limit(), 25);
    }
}
