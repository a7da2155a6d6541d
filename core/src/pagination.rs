//! Page-number pagination for conflict listings.

use crate::{
    config::PaginationConfig,
    error::{AcledError, AcledResult},
};
use serde::{Deserialize, Serialize};

/// Raw paging parameters as they arrive in a query string.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Validated paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn resolve(&self, config: &PaginationConfig) -> AcledResult<Page> {
        let page = self.page.unwrap_or(1);
        let per_page = self.per_page.unwrap_or(config.default_per_page as i64);
        if page < 1 || per_page < 1 || per_page > config.max_per_page as i64 || page > u32::MAX as i64 {
            return Err(AcledError::validation(
                "Invalid pagination parameters provided from URL",
            ));
        }
        Ok(Page {
            page: page as u32,
            per_page: per_page as u32,
        })
    }
}

impl Page {
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }

    pub fn limit(&self) -> u64 {
        self.per_page as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paginated<T> {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub data: Vec<T>,
}
