//! Collections that actions can page through and narrow with client filters.

use crate::action::FilterSpec;
use crate::config::LanyardConfig;
use crate::error::{ActionError, ConfigError};
use crate::filter::{filters_flag, parse_filters, FilterOperator};
use crate::params::ParamSet;
use crate::subject::{Field, SubjectRef};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A pageable, filterable sequence of records.
pub trait Collection: Send + Sized + 'static {
    /// Record type handed to the per-item transform.
    type Item;

    /// Number of records before paging.
    fn total_records(&self) -> usize;

    /// Page size the collection prefers; the registry default applies when `None`.
    fn default_per_page(&self) -> Option<usize> {
        None
    }

    /// Records on `page` (1-based) with `per_page` records per page.
    fn page(self, page: usize, per_page: usize) -> Vec<Self::Item>;

    /// Keep the records whose `attribute` satisfies the operator.
    fn narrow(self, attribute: &str, operator: FilterOperator, value: &Value) -> Self;
}

fn slice_page<T>(items: Vec<T>, page: usize, per_page: usize) -> Vec<T> {
    let skip = page.saturating_sub(1).saturating_mul(per_page);
    items.into_iter().skip(skip).take(per_page).collect()
}

impl Collection for Vec<Value> {
    type Item = Value;

    fn total_records(&self) -> usize {
        self.len()
    }

    fn page(self, page: usize, per_page: usize) -> Vec<Value> {
        slice_page(self, page, per_page)
    }

    fn narrow(mut self, attribute: &str, operator: FilterOperator, value: &Value) -> Self {
        self.retain(|item| operator.matches(item.get(attribute).unwrap_or(&Value::Null), value));
        self
    }
}

impl Collection for Vec<SubjectRef> {
    type Item = SubjectRef;

    fn total_records(&self) -> usize {
        self.len()
    }

    fn page(self, page: usize, per_page: usize) -> Vec<SubjectRef> {
        slice_page(self, page, per_page)
    }

    fn narrow(mut self, attribute: &str, operator: FilterOperator, value: &Value) -> Self {
        self.retain(|item| {
            let actual = item.field(attribute).map(Field::into_value).unwrap_or(Value::Null);
            operator.matches(&actual, value)
        });
        self
    }
}

/// Effective paging window, recorded as the `paginated` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// 1-based page number.
    pub page: usize,
    /// Records per page.
    pub per_page: usize,
    /// `ceil(total_records / per_page)`.
    pub total_pages: usize,
    /// Records before paging.
    pub total_records: usize,
}

impl Pagination {
    /// Resolve the window from the caller's `page` / `per_page` parameters.
    ///
    /// A `per_page` outside `1..=max_per_page` (or missing) falls back to the default page
    /// size, itself capped at `max_per_page`; a `page` below 1 becomes 1.
    pub fn resolve(
        params: &ParamSet,
        config: &LanyardConfig,
        default_per_page: Option<usize>,
        max_per_page: usize,
        total_records: usize,
    ) -> Self {
        let ceiling = max_per_page.max(1);
        let fallback = default_per_page.unwrap_or(config.default_per_page).clamp(1, ceiling);
        let per_page = params
            .get_i64(&config.per_page_param)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| (1..=max_per_page).contains(n))
            .unwrap_or(fallback);
        let page = params
            .get_i64(&config.page_param)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(1)
            .max(1);
        Self { page, per_page, total_pages: total_records.div_ceil(per_page), total_records }
    }

    /// Flag payload.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "page": self.page,
            "per_page": self.per_page,
            "total_pages": self.total_pages,
            "total_records": self.total_records,
        })
    }
}

/// Narrow `collection` by the client's raw filter object.
///
/// Returns the narrowed collection and the `filters` flag payload.
pub fn apply_filters<C: Collection>(
    mut collection: C,
    raw: Option<&Value>,
    declared: &BTreeMap<String, FilterSpec>,
) -> Result<(C, Value), ActionError> {
    let applied = match raw {
        Some(raw) => parse_filters(raw, declared)?,
        None => Vec::new(),
    };
    for filter in &applied {
        let block = declared.get(&filter.attribute).and_then(FilterSpec::block);
        collection = match block {
            Some(block) => {
                let narrowed = block(filter.operator, &filter.value, Box::new(collection))?;
                *narrowed.downcast::<C>().map_err(|_| ConfigError::FilterCollectionMismatch {
                    attribute: filter.attribute.clone(),
                })?
            }
            None => collection.narrow(&filter.attribute, filter.operator, &filter.value),
        };
    }
    Ok((collection, filters_flag(&applied)))
}
