//! dryrun SQL generation
//!
//! Pure string transformations: a span tokenizer, literal subqueries for
//! predicted schemas, upstream reference substitution and the statement
//! builders used to prepare dry run queries. Nothing here touches the
//! warehouse.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod literal;
pub mod rewrite;
pub mod statements;
pub mod token;

pub use literal::{example_value, field_to_literal, table_to_literal};
pub use rewrite::replace_upstream_reference;
pub use statements::{
    add_max_partition_declaration, add_sql_header, create_or_replace_view, has_recursive_cte,
    merge_sql, partition_default_value, MAX_PARTITION_VARIABLE,
};
pub use token::{tokenize, Token, TokenKind};
