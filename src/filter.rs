// Index filters and ordering for store queries

use crate::record::IndexValue;
use serde::{Deserialize, Serialize};

/// Filter on an indexed column
#[derive(Debug, Clone)]
pub struct Filter {
    /// Indexed field name
    pub field: String,
    /// Comparison operator
    pub op: FilterOp,
    /// Value to compare against
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<IndexValue>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }
}

/// Comparison operators for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,       // ==
    Gte,      // >=
    Contains, // LIKE %value%
}

impl FilterOp {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Gte => ">=",
            FilterOp::Contains => "LIKE",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_sql())
    }
}

/// Sort direction, shared by store ordering and in-memory sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Ordering for a store listing: an indexed field (or `updated_at`) and a direction
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(field: &str, direction: SortDirection) -> Self {
        Self {
            field: field.to_string(),
            direction,
        }
    }
}

impl Default for OrderBy {
    fn default() -> Self {
        Self::new("updated_at", SortDirection::Desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_eq_constructor() {
        let filter = Filter::eq("auth_id", "auth-7");

        assert_eq!(filter.field, "auth_id");
        assert_eq!(filter.op, FilterOp::Eq);
        assert_eq!(filter.value, IndexValue::String("auth-7".to_string()));
    }

    #[test]
    fn test_filter_op_to_sql() {
        assert_eq!(FilterOp::Eq.to_sql(), "=");
        assert_eq!(FilterOp::Gte.to_sql(), ">=");
        assert_eq!(FilterOp::Contains.to_sql(), "LIKE");
        assert_eq!(FilterOp::Gte.to_string(), ">=");
    }

    #[test]
    fn test_sort_direction_sql_and_serde() {
        assert_eq!(SortDirection::Asc.to_sql(), "ASC");
        assert_eq!(SortDirection::default(), SortDirection::Desc);
        assert_eq!(serde_json::to_string(&SortDirection::Asc).unwrap(), "\"asc\"");
    }

    #[test]
    fn test_default_order_is_newest_first() {
        let order = OrderBy::default();
        assert_eq!(order.field, "updated_at");
        assert_eq!(order.direction, SortDirection::Desc);
    }
}
