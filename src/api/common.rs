//! Common API utilities and shared types

use serde::Deserialize;

use crate::models::ListParams;

pub fn default_page() -> u32 {
    1
}

pub fn default_per_page() -> u32 {
    10
}

/// `?page=&per_page=`; out-of-range values are clamped, not rejected.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Treat `?keyword=` the same as an absent parameter.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
