//! SQL generation
//!
//! Identifier validation, dialects, condition rendering, statement building and DDL.

pub mod builder;
pub mod condition;
pub mod ddl;
pub mod dialect;
pub mod sanitize;

pub use builder::{DEFAULT_PAGE_SIZE, PagePlan, SqlBuilder, Statement, plan_pagination};
pub use condition::{build_group_by, build_sort_by, build_where};
pub use ddl::DdlGenerator;
pub use dialect::{Dialect, MySql, Sqlite, dialect_for_url};
pub use sanitize::{validate_identifier, validate_key};
