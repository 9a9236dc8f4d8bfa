//! Paged query results
//!
//! A paged query applies `LIMIT pageSize OFFSET (pageNumber - 1) * pageSize`
//! and the statistics column in one round trip; the total row count read
//! from that column drives the page metadata.

use super::selector::{read_total, HandlerContext, QueryHandler, Selector};
use crate::error::{DbError, DbResult};
use crate::session::ResultSet;
use serde::Serialize;
use std::sync::Arc;

/// One page of query results plus its position in the whole result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub page_number: i64,
    pub page_size: i64,
    pub total_item_count: i64,
    pub page_count: i64,
    /// One-based index of the first item on this page, 0 when empty
    pub first_item_on_page: i64,
    pub last_item_on_page: i64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
    pub is_first_page: bool,
    pub is_last_page: bool,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, page_number: i64, page_size: i64, total_item_count: i64) -> Self {
        let page_count = if total_item_count > 0 {
            total_item_count / page_size + i64::from(total_item_count % page_size != 0)
        } else {
            0
        };
        let has_pages = page_count > 0;

        let first_item_on_page = if has_pages {
            page_offset(page_number, page_size).saturating_add(1)
        } else {
            0
        };
        let last_item_on_page = if has_pages {
            first_item_on_page
                .saturating_add(page_size - 1)
                .min(total_item_count)
        } else {
            0
        };

        Self {
            items,
            page_number,
            page_size,
            total_item_count,
            page_count,
            first_item_on_page,
            last_item_on_page,
            has_previous_page: has_pages && page_number > 1,
            has_next_page: has_pages && page_number < page_count,
            is_first_page: has_pages && page_number == 1,
            is_last_page: has_pages && page_number >= page_count,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Reject page numbers or sizes below 1, and pages starting past `i64::MAX` rows
pub fn validate_page(page_number: i64, page_size: i64) -> DbResult<()> {
    if page_number < 1 {
        return Err(DbError::page_number_out_of_range(page_number));
    }
    if page_size < 1 {
        return Err(DbError::page_size_out_of_range(page_size));
    }
    if (page_number - 1).checked_mul(page_size).is_none() {
        return Err(DbError::page_offset_out_of_range(page_number));
    }
    Ok(())
}

/// Number of rows skipped before the requested page
pub fn page_offset(page_number: i64, page_size: i64) -> i64 {
    (page_number - 1).saturating_mul(page_size)
}

pub struct PagedListHandler<T> {
    selector: Arc<dyn Selector<T>>,
    stats_column: usize,
    page_number: i64,
    page_size: i64,
}

impl<T> PagedListHandler<T> {
    pub fn new(selector: Arc<dyn Selector<T>>, stats_column: usize, page_number: i64, page_size: i64) -> Self {
        Self {
            selector,
            stats_column,
            page_number,
            page_size,
        }
    }
}

impl<T> QueryHandler<PagedResult<T>> for PagedListHandler<T> {
    fn handle(&self, results: &ResultSet, context: &HandlerContext<'_>) -> DbResult<PagedResult<T>> {
        let total = match results.rows.first() {
            Some(row) => read_total(row, self.stats_column)?,
            None => 0,
        };
        if let Some(statistics) = context.statistics {
            statistics.set_total_results(total);
        }

        let items = results
            .rows
            .iter()
            .map(|row| self.selector.select(row, context))
            .collect::<DbResult<Vec<_>>>()?;

        Ok(PagedResult::new(items, self.page_number, self.page_size, total as i64))
    }
}
