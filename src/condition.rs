//! Fluent query and update conditions
//!
//! A [`Condition`] collects predicates, sort keys, grouping, pagination,
//! projections and an update payload for a single statement. Predicates, sort
//! keys and group keys append; every other setter overwrites.
//!
//! ```rust
//! use relstore::{Condition, Order};
//!
//! let cnd = Condition::new()
//!     .eq("a", 1)
//!     .or([Condition::new().eq("b", 2), Condition::new().eq("c", 3)])
//!     .order_by("ctime", Order::Desc)
//!     .limit(1, 20);
//! assert_eq!(cnd.predicates().len(), 2);
//! ```

use std::any::TypeId;

use crate::model::Model;
use crate::types::Value;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    NotBetween,
    In,
    NotIn,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

/// One node of a condition's predicate list
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        key: String,
        op: Operator,
        values: Vec<Value>,
    },
    /// Any of the nested conditions' predicate sets must hold
    Or(Vec<Condition>),
}

impl Predicate {
    fn restricts_rows(&self) -> bool {
        match self {
            Predicate::Compare {
                op: Operator::NotIn,
                values,
                ..
            } => !values.is_empty(),
            Predicate::Compare { .. } => true,
            Predicate::Or(nested) => {
                let mut branches = nested.iter().filter(|c| c.has_predicates()).peekable();
                branches.peek().is_some() && branches.all(Condition::restricts_rows)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub key: String,
    pub order: Order,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Left,
    Right,
    Inner,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Inner => "INNER JOIN",
        }
    }
}

/// FROM clause of a complex query
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub table: String,
    pub alias: String,
}

/// A joined table with its ON expression
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub on: String,
}

/// Pagination state
///
/// `page_total` and `page_count` are filled in by the engine when it counts
/// the matching rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pagination {
    pub page_no: u64,
    pub page_size: u64,
    pub page_total: Option<u64>,
    pub page_count: Option<u64>,
    /// `page_no` is a row offset rather than a 1-based page number
    pub is_offset: bool,
}

/// Column list and positional values for update-by-condition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Upset {
    pub keys: Vec<String>,
    pub values: Vec<Value>,
}

/// Model a condition is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRef {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

/// Filters, ordering, paging and update payload for one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    model: Option<ModelRef>,
    predicates: Vec<Predicate>,
    sorts: Vec<SortKey>,
    groups: Vec<String>,
    pagination: Pagination,
    upset: Option<Upset>,
    fields: Vec<String>,
    from: Option<FromClause>,
    join: Option<JoinClause>,
}

impl Condition {
    /// An unbound condition, for nesting under [`Condition::or`] or for finds
    pub fn new() -> Self {
        Self::default()
    }

    /// A condition bound to model `T`
    pub fn model<T: Model>() -> Self {
        Self {
            model: Some(ModelRef {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
            }),
            ..Self::default()
        }
    }

    fn push(mut self, key: impl Into<String>, op: Operator, values: Vec<Value>) -> Self {
        self.predicates.push(Predicate::Compare {
            key: key.into(),
            op,
            values,
        });
        self
    }

    pub fn eq(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, Operator::Eq, vec![value.into()])
    }

    pub fn not_eq(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, Operator::NotEq, vec![value.into()])
    }

    pub fn lt(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, Operator::Lt, vec![value.into()])
    }

    pub fn lte(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, Operator::Lte, vec![value.into()])
    }

    pub fn gt(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, Operator::Gt, vec![value.into()])
    }

    pub fn gte(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, Operator::Gte, vec![value.into()])
    }

    pub fn between(
        self,
        key: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push(key, Operator::Between, vec![low.into(), high.into()])
    }

    pub fn not_between(
        self,
        key: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.push(key, Operator::NotBetween, vec![low.into(), high.into()])
    }

    pub fn in_list<V: Into<Value>>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push(key, Operator::In, values)
    }

    pub fn not_in_list<V: Into<Value>>(
        self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.push(key, Operator::NotIn, values)
    }

    /// `value` is used verbatim as the LIKE pattern, wildcards included
    pub fn like(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, Operator::Like, vec![value.into()])
    }

    pub fn not_like(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(key, Operator::NotLike, vec![value.into()])
    }

    pub fn is_null(self, key: impl Into<String>) -> Self {
        self.push(key, Operator::IsNull, Vec::new())
    }

    pub fn is_not_null(self, key: impl Into<String>) -> Self {
        self.push(key, Operator::IsNotNull, Vec::new())
    }

    /// Append one OR node over the given conditions' predicate sets
    pub fn or(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.predicates
            .push(Predicate::Or(conditions.into_iter().collect()));
        self
    }

    pub fn order_by(mut self, key: impl Into<String>, order: Order) -> Self {
        self.sorts.push(SortKey {
            key: key.into(),
            order,
        });
        self
    }

    pub fn group_by<K: Into<String>>(mut self, keys: impl IntoIterator<Item = K>) -> Self {
        self.groups.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Projection. Plain column names for simple finds; arbitrary select
    /// expressions (`count(a.id) as id`) for complex finds.
    pub fn fields<K: Into<String>>(mut self, fields: impl IntoIterator<Item = K>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn from(mut self, table: impl Into<String>, alias: impl Into<String>) -> Self {
        self.from = Some(FromClause {
            table: table.into(),
            alias: alias.into(),
        });
        self
    }

    /// `table` may carry an alias (`"order o"`); `on` is a trusted SQL expression
    pub fn join(mut self, kind: JoinKind, table: impl Into<String>, on: impl Into<String>) -> Self {
        self.join = Some(JoinClause {
            kind,
            table: table.into(),
            on: on.into(),
        });
        self
    }

    /// Page-based pagination; `page_no` starts at 1. A total stored by an
    /// earlier count is kept.
    pub fn limit(mut self, page_no: u64, page_size: u64) -> Self {
        self.pagination.page_no = page_no;
        self.pagination.page_size = page_size;
        self.pagination.is_offset = false;
        self.refresh_page_count();
        self
    }

    /// Offset-based pagination: skip `start` rows, return at most `count`
    pub fn offset(mut self, start: u64, count: u64) -> Self {
        self.pagination.page_no = start;
        self.pagination.page_size = count;
        self.pagination.is_offset = true;
        self.refresh_page_count();
        self
    }

    /// Update payload for update-by-condition. Key and value counts are checked
    /// when the statement is built.
    pub fn upset<K: Into<String>, V: Into<Value>>(
        mut self,
        keys: impl IntoIterator<Item = K>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.upset = Some(Upset {
            keys: keys.into_iter().map(Into::into).collect(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn model_ref(&self) -> Option<ModelRef> {
        self.model
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn sorts(&self) -> &[SortKey] {
        &self.sorts
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn upset_payload(&self) -> Option<&Upset> {
        self.upset.as_ref()
    }

    pub fn projected_fields(&self) -> &[String] {
        &self.fields
    }

    pub fn from_clause(&self) -> Option<&FromClause> {
        self.from.as_ref()
    }

    pub fn join_clause(&self) -> Option<&JoinClause> {
        self.join.as_ref()
    }

    /// True when at least one predicate would render. OR nodes whose nested
    /// conditions are all empty render nothing.
    pub fn has_predicates(&self) -> bool {
        self.predicates.iter().any(|p| match p {
            Predicate::Compare { .. } => true,
            Predicate::Or(nested) => nested.iter().any(Condition::has_predicates),
        })
    }

    /// True when the rendered WHERE clause can exclude a row. An empty NOT IN
    /// always holds, and an OR holds whenever one of its branches always holds.
    pub fn restricts_rows(&self) -> bool {
        self.predicates.iter().any(Predicate::restricts_rows)
    }

    pub fn is_complex(&self) -> bool {
        self.from.is_some()
    }

    /// Store the result of a count
    pub(crate) fn set_total(&mut self, total: u64) {
        self.pagination.page_total = Some(total);
        self.refresh_page_count();
    }

    fn refresh_page_count(&mut self) {
        let size = self.pagination.page_size;
        self.pagination.page_count = match self.pagination.page_total {
            Some(total) if size > 0 => Some(total.div_ceil(size)),
            _ => None,
        };
    }
}
