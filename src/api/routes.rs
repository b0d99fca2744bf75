use serde::Deserialize;

/// Pagination parameters shared by the list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn limit_is_clamped() {
        let params = PaginationParams {
            limit: Some(1000),
            offset: Some(-5),
        };
        assert_eq!(params.limit(), 100);
        assert_eq!(params.offset(), 0);
    }

    #[test_log::test]
    fn defaults_apply() {
        let params = PaginationParams::default();
        assert_eq!(params.limit(), 50);
        assert_eq!(params.offset(), 0);
    }
}
