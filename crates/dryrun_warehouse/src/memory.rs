//! In-memory warehouse.
//!
//! Serves relation schemas from a catalog and answers queries from scripted
//! responses matched by substring. Every query is recorded so tests can
//! assert on the SQL a run produced.

use crate::warehouse::{QueryOutcome, Warehouse, WarehouseResult};
use async_trait::async_trait;
use dryrun_core::{Table, TableRef};
use indexmap::IndexMap;
use std::sync::{Mutex, PoisonError, RwLock};

struct ScriptedResponse {
    pattern: String,
    response: WarehouseResult<QueryOutcome>,
    once: bool,
}

/// A warehouse held entirely in memory
pub struct MemoryWarehouse {
    catalog: RwLock<IndexMap<TableRef, Table>>,
    responses: Mutex<Vec<ScriptedResponse>>,
    default_response: WarehouseResult<QueryOutcome>,
    queries: Mutex<Vec<String>>,
}

impl MemoryWarehouse {
    /// Empty catalog; unmatched queries succeed with an empty table
    #[must_use]
    pub fn new() -> Self {
        Self {
            catalog: RwLock::new(IndexMap::new()),
            responses: Mutex::new(Vec::new()),
            default_response: Ok(QueryOutcome::Success(Table::default())),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Add an existing relation
    #[must_use]
    pub fn with_table(self, table_ref: TableRef, table: Table) -> Self {
        self.insert_table(table_ref, table);
        self
    }

    /// Answer queries containing `pattern` with `response`
    ///
    /// Patterns are tried in registration order.
    #[must_use]
    pub fn on_query(self, pattern: impl Into<String>, response: WarehouseResult<QueryOutcome>) -> Self {
        self.script(pattern.into(), response, false);
        self
    }

    /// Like [`MemoryWarehouse::on_query`], but the response is used only once
    #[must_use]
    pub fn on_query_once(
        self,
        pattern: impl Into<String>,
        response: WarehouseResult<QueryOutcome>,
    ) -> Self {
        self.script(pattern.into(), response, true);
        self
    }

    /// Response for queries no pattern matches
    #[must_use]
    pub fn with_default_response(mut self, response: WarehouseResult<QueryOutcome>) -> Self {
        self.default_response = response;
        self
    }

    /// Add or replace a relation
    pub fn insert_table(&self, table_ref: TableRef, table: Table) {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table_ref, table);
    }

    fn script(&self, pattern: String, response: WarehouseResult<QueryOutcome>, once: bool) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ScriptedResponse {
                pattern,
                response,
                once,
            });
    }

    fn respond(&self, sql: &str) -> WarehouseResult<QueryOutcome> {
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        match responses.iter().position(|r| sql.contains(&r.pattern)) {
            Some(index) if responses[index].once => responses.remove(index).response,
            Some(index) => responses[index].response.clone(),
            None => self.default_response.clone(),
        }
    }

    /// Every query received, in order
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of queries received
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn query(&self, sql: &str) -> WarehouseResult<QueryOutcome> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
        self.respond(sql)
    }

    async fn get_node_schema(&self, table_ref: &TableRef) -> WarehouseResult<Option<Table>> {
        Ok(self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table_ref)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{RejectionKind, WarehouseError};
    use dryrun_core::{Field, FieldType};

    fn table(name: &str) -> Table {
        Table::new(vec![Field::new(name, FieldType::String)])
    }

    #[tokio::test]
    async fn test_catalog_lookup() {
        let table_ref = TableRef::new("db", "s", "t");
        let warehouse = MemoryWarehouse::new().with_table(table_ref.clone(), table("a"));
        assert_eq!(warehouse.get_node_schema(&table_ref).await.unwrap(), Some(table("a")));
        assert!(warehouse.node_exists(&table_ref).await.unwrap());
        assert!(!warehouse
            .node_exists(&TableRef::new("db", "s", "other"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_first_matching_pattern_wins() {
        let warehouse = MemoryWarehouse::new()
            .on_query("FROM a", Ok(QueryOutcome::Success(table("x"))))
            .on_query("FROM", Ok(QueryOutcome::Success(table("y"))));
        assert_eq!(
            warehouse.query("SELECT * FROM a").await.unwrap(),
            QueryOutcome::Success(table("x"))
        );
        assert_eq!(
            warehouse.query("SELECT * FROM b").await.unwrap(),
            QueryOutcome::Success(table("y"))
        );
        assert_eq!(
            warehouse.query("SELECT 1").await.unwrap(),
            QueryOutcome::Success(Table::default())
        );
    }

    #[tokio::test]
    async fn test_once_responses_are_consumed() {
        let warehouse = MemoryWarehouse::new()
            .on_query_once(
                "x",
                Err(WarehouseError::Timeout {
                    message: "slow".into(),
                }),
            )
            .with_default_response(Ok(QueryOutcome::rejected(RejectionKind::BadRequest, "bad")));
        assert!(warehouse.query("x").await.is_err());
        assert!(matches!(
            warehouse.query("x").await,
            Ok(QueryOutcome::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_queries_are_recorded() {
        let warehouse = MemoryWarehouse::new();
        warehouse.query("SELECT 1").await.unwrap();
        warehouse.query("SELECT 2").await.unwrap();
        assert_eq!(warehouse.queries(), vec!["SELECT 1", "SELECT 2"]);
        assert_eq!(warehouse.query_count(), 2);
    }
}
