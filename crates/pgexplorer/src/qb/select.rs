//! SELECT query builder over a sanitized table.

use crate::filter::{Filter, build_filters};
use crate::ident::QualifiedTable;
use crate::qb::param::ParamList;
use crate::qb::traits::SqlQb;
use crate::sort::{Sort, build_sorts};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Projection {
    All,
    Count,
}

/// SELECT query builder with clauses held as typed fields.
///
/// Rendering always emits `WHERE`, then `ORDER BY`, then `LIMIT`, then `OFFSET`.
#[derive(Clone, Debug)]
pub struct SelectQb {
    table: QualifiedTable,
    projection: Projection,
    /// WHERE predicates, ANDed
    predicates: Vec<Filter>,
    /// ORDER BY terms
    order: Vec<Sort>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl SelectQb {
    /// `SELECT * FROM schema.table`
    pub fn new(table: QualifiedTable) -> Self {
        Self {
            table,
            projection: Projection::All,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// `SELECT COUNT(*) AS count FROM schema.table`; ordering and paging are ignored.
    pub fn count(table: QualifiedTable) -> Self {
        Self {
            projection: Projection::Count,
            ..Self::new(table)
        }
    }

    pub fn is_count(&self) -> bool {
        self.projection == Projection::Count
    }

    /// Add one WHERE predicate.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.predicates.push(filter);
        self
    }

    /// Add WHERE predicates; they are ANDed with any already present.
    pub fn filters(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.predicates.extend(filters);
        self
    }

    /// Append one ORDER BY term.
    pub fn order_by(mut self, sort: Sort) -> Self {
        self.order.push(sort);
        self
    }

    /// Replace the ORDER BY list; an empty list keeps the current one.
    pub fn replace_order(mut self, sorts: impl IntoIterator<Item = Sort>) -> Self {
        let sorts: Vec<Sort> = sorts.into_iter().collect();
        if !sorts.is_empty() {
            self.order = sorts;
        }
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: i64) -> Self {
        self.offset = Some(n);
        self
    }

    /// 1-based page number.
    pub fn paginate(self, page: i64, per_page: i64) -> Self {
        let page = page.max(1);
        self.limit(per_page).offset((page - 1).saturating_mul(per_page))
    }

    pub fn predicates(&self) -> &[Filter] {
        &self.predicates
    }

    pub fn order(&self) -> &[Sort] {
        &self.order
    }

    /// The same selection as a row count.
    pub fn to_count(&self) -> Self {
        Self {
            table: self.table.clone(),
            projection: Projection::Count,
            predicates: self.predicates.clone(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }
}

impl SqlQb for SelectQb {
    fn build(&self, params: &mut ParamList) -> String {
        let mut sql = match self.projection {
            Projection::All => String::from("SELECT * FROM "),
            Projection::Count => String::from("SELECT COUNT(*) AS count FROM "),
        };
        self.table.write_sql(&mut sql);

        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&build_filters(&self.predicates, params));
        }

        if self.projection == Projection::All {
            if !self.order.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&build_sorts(&self.order));
            }
            if let Some(limit) = self.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        sql
    }

    fn tag(&self) -> &'static str {
        match self.projection {
            Projection::All => "select",
            Projection::Count => "count",
        }
    }
}
