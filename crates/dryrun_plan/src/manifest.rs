//! Manifest model.
//!
//! The manifest is the JSON document describing every node of the project
//! together with its compiled SQL. It is parsed once at startup; nodes are
//! shared as `Arc<Node>` and never mutated afterwards.

use crate::error::{PlanError, PlanResult};
use dryrun_core::TableRef;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Metadata key that switches column linting on for a node
pub const CHECK_COLUMNS_META_KEY: &str = "dry_run.check_columns";

/// Kind of project resource a node represents
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceType {
    /// SQL model
    Model,
    /// CSV seed
    Seed,
    /// Snapshot
    Snapshot,
    /// Source table
    Source,
    /// Data test
    Test,
    /// Anything else (analysis, operation, ...)
    Other(String),
}

impl ResourceType {
    /// Manifest spelling
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Model => "model",
            Self::Seed => "seed",
            Self::Snapshot => "snapshot",
            Self::Source => "source",
            Self::Test => "test",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for ResourceType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "model" => Self::Model,
            "seed" => Self::Seed,
            "snapshot" => Self::Snapshot,
            "source" => Self::Source,
            "test" => Self::Test,
            _ => Self::Other(value),
        }
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a node lands its output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Materialization {
    /// `CREATE VIEW`
    View,
    /// `CREATE TABLE`
    Table,
    /// Merge into an existing table
    Incremental,
    /// Inlined into dependents, never materialized
    Ephemeral,
    /// Seed load
    Seed,
    /// Snapshot merge
    Snapshot,
    /// Data test
    Test,
    /// Custom materialization
    Other(String),
}

impl Materialization {
    /// Manifest spelling
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::View => "view",
            Self::Table => "table",
            Self::Incremental => "incremental",
            Self::Ephemeral => "ephemeral",
            Self::Seed => "seed",
            Self::Snapshot => "snapshot",
            Self::Test => "test",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for Materialization {
    fn from(value: String) -> Self {
        match value.as_str() {
            "view" => Self::View,
            "table" => Self::Table,
            "incremental" => Self::Incremental,
            "ephemeral" => Self::Ephemeral,
            "seed" => Self::Seed,
            "snapshot" => Self::Snapshot,
            "test" => Self::Test,
            _ => Self::Other(value),
        }
    }
}

impl std::fmt::Display for Materialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Materialization> for String {
    fn from(value: Materialization) -> Self {
        value.as_str().to_string()
    }
}

/// Policy for incremental models whose predicted columns drift from the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnSchemaChange {
    /// Keep the target schema
    #[default]
    Ignore,
    /// Add predicted columns missing from the target
    AppendNewColumns,
    /// Add new columns and drop removed ones
    SyncAllColumns,
    /// Fail when the column sets differ
    Fail,
}

/// Partition column type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionDataType {
    /// TIMESTAMP partition
    Timestamp,
    /// DATE partition
    #[default]
    Date,
    /// DATETIME partition
    Datetime,
    /// Integer range partition
    Int64,
}

impl PartitionDataType {
    /// Lower-case name as used in `DECLARE` statements
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Int64 => "int64",
        }
    }
}

impl<'de> Deserialize<'de> for PartitionDataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "timestamp" => Ok(Self::Timestamp),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::Datetime),
            "int64" => Ok(Self::Int64),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["timestamp", "date", "datetime", "int64"],
            )),
        }
    }
}

/// Integer range partitioning bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntPartitionRange {
    /// Inclusive start
    pub start: i64,
    /// Exclusive end
    pub end: i64,
    /// Bucket width
    pub interval: i64,
}

/// `partition_by` config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBy {
    /// Partition column
    pub field: String,
    /// Partition column type
    #[serde(default)]
    pub data_type: PartitionDataType,
    /// Integer range, for int64 partitions
    #[serde(default)]
    pub range: Option<IntPartitionRange>,
    /// Partitioned by ingestion time (`_PARTITIONTIME`)
    #[serde(default)]
    pub time_ingestion_partitioning: Option<bool>,
}

/// Snapshot `unique_key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniqueKey {
    /// One column
    Single(String),
    /// Composite key
    Composite(Vec<String>),
}

/// Snapshot `check_cols`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckCols {
    /// The `"all"` sentinel
    All,
    /// Explicit column list
    Columns(Vec<String>),
}

impl Serialize for CheckCols {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::Columns(columns) => columns.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CheckCols {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Keyword(String),
            Columns(Vec<String>),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Keyword(word) if word == "all" => Ok(Self::All),
            Repr::Keyword(word) => Err(serde::de::Error::custom(format!(
                "check_cols must be \"all\" or a list of columns, got \"{}\"",
                word
            ))),
            Repr::Columns(columns) => Ok(Self::Columns(columns)),
        }
    }
}

/// What happens to rows deleted from a snapshot source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardDeletes {
    /// Keep the last version
    Ignore,
    /// Close the validity window
    Invalidate,
    /// Insert a deletion record with `dbt_is_deleted`
    NewRecord,
}

/// Per-node configuration block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Disabled nodes are never scheduled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Materialization
    #[serde(default)]
    pub materialized: Option<Materialization>,
    /// Incremental drift policy
    #[serde(default)]
    pub on_schema_change: Option<OnSchemaChange>,
    /// Statement(s) prepended to the query
    #[serde(default)]
    pub sql_header: Option<String>,
    /// Snapshot unique key
    #[serde(default)]
    pub unique_key: Option<UniqueKey>,
    /// Snapshot `updated_at` column
    #[serde(default)]
    pub updated_at: Option<String>,
    /// Snapshot strategy, checked when the snapshot runs
    #[serde(default)]
    pub strategy: Option<String>,
    /// Snapshot check columns
    #[serde(default)]
    pub check_cols: Option<CheckCols>,
    /// Partitioning
    #[serde(default)]
    pub partition_by: Option<PartitionBy>,
    /// Config-level metadata, wins over node metadata
    #[serde(default)]
    pub meta: Option<IndexMap<String, Value>>,
    /// Node-level full refresh override
    #[serde(default)]
    pub full_refresh: Option<bool>,
    /// Seed column type overrides
    #[serde(default)]
    pub column_types: IndexMap<String, String>,
    /// Seed CSV delimiter
    #[serde(default)]
    pub delimiter: Option<String>,
    /// Snapshot hard delete handling
    #[serde(default)]
    pub hard_deletes: Option<HardDeletes>,
    /// Tags from config
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            materialized: None,
            on_schema_change: None,
            sql_header: None,
            unique_key: None,
            updated_at: None,
            strategy: None,
            check_cols: None,
            partition_by: None,
            meta: None,
            full_refresh: None,
            column_types: IndexMap::new(),
            delimiter: None,
            hard_deletes: None,
            tags: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Config with the given materialization
    #[must_use]
    pub fn materialized(materialization: Materialization) -> Self {
        Self {
            materialized: Some(materialization),
            ..Self::default()
        }
    }
}

/// Declared column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestColumn {
    /// Column name, dotted for nested fields
    pub name: String,
    /// Documentation
    #[serde(default)]
    pub description: Option<String>,
    /// Declared type, `[]` suffix for arrays
    #[serde(default)]
    pub data_type: Option<String>,
}

impl ManifestColumn {
    /// Create a column with a declared type
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: None,
            data_type: data_type.map(str::to_string),
        }
    }
}

/// External table settings for a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalConfig {
    /// Storage location
    pub location: String,
    /// Columns used instead of `columns` when non-empty
    #[serde(default)]
    pub dry_run_columns: Vec<ManifestColumn>,
}

/// Direct dependencies as recorded in the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependsOn {
    /// Node ids
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Macro ids
    #[serde(default)]
    pub macros: Vec<String>,
}

/// A manifest node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id, e.g. `model.project.name`
    pub unique_id: String,
    /// Short name
    pub name: String,
    /// Resource type
    pub resource_type: ResourceType,
    /// Configuration
    #[serde(default)]
    pub config: NodeConfig,
    /// Whether `compiled_code` is populated
    #[serde(default)]
    pub compiled: bool,
    /// Compiled SQL
    #[serde(default, alias = "compiled_sql")]
    pub compiled_code: String,
    /// Target database / project
    pub database: String,
    /// Target schema / dataset
    pub schema: String,
    /// Target relation name, `name` when absent
    #[serde(default)]
    pub alias: Option<String>,
    /// Authoring language
    #[serde(default)]
    pub language: Option<String>,
    /// Path of the defining file, relative to `root_path`
    #[serde(default)]
    pub original_file_path: String,
    /// Project root
    #[serde(default)]
    pub root_path: Option<String>,
    /// Declared columns
    #[serde(default)]
    pub columns: IndexMap<String, ManifestColumn>,
    /// Node-level metadata
    #[serde(default)]
    pub meta: Option<IndexMap<String, Value>>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// External table settings
    #[serde(default)]
    pub external: Option<ExternalConfig>,
    /// Direct dependencies
    #[serde(default)]
    pub depends_on: DependsOn,
}

impl Node {
    /// Create a compiled node with default config
    #[must_use]
    pub fn new(unique_id: impl Into<String>, resource_type: ResourceType) -> Self {
        let unique_id = unique_id.into();
        Self {
            name: unique_id.clone(),
            unique_id,
            resource_type,
            config: NodeConfig::default(),
            compiled: true,
            compiled_code: String::new(),
            database: "my_db".to_string(),
            schema: "my_schema".to_string(),
            alias: None,
            language: None,
            original_file_path: String::new(),
            root_path: None,
            columns: IndexMap::new(),
            meta: None,
            tags: Vec::new(),
            external: None,
            depends_on: DependsOn::default(),
        }
    }

    /// Set the materialization
    #[must_use]
    pub fn with_materialized(mut self, materialization: Materialization) -> Self {
        self.config.materialized = Some(materialization);
        self
    }

    /// Replace the config
    #[must_use]
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the compiled SQL
    #[must_use]
    pub fn with_compiled_code(mut self, sql: impl Into<String>) -> Self {
        self.compiled = true;
        self.compiled_code = sql.into();
        self
    }

    /// Set the direct node dependencies
    #[must_use]
    pub fn with_depends_on<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the target database and schema
    #[must_use]
    pub fn with_location(mut self, database: impl Into<String>, schema: impl Into<String>) -> Self {
        self.database = database.into();
        self.schema = schema.into();
        self
    }

    /// Set the alias
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set the declared columns
    #[must_use]
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ManifestColumn>) -> Self {
        self.columns = columns.into_iter().map(|c| (c.name.clone(), c)).collect();
        self
    }

    /// Mark as an external source
    #[must_use]
    pub fn with_external(mut self, external: ExternalConfig) -> Self {
        self.external = Some(external);
        self
    }

    /// Set the tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Relation name in the warehouse
    #[must_use]
    pub fn alias(&self) -> &str {
        match &self.alias {
            Some(alias) if !alias.is_empty() => alias,
            _ => &self.name,
        }
    }

    /// Fully-qualified reference to the node's relation
    #[must_use]
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.database, &self.schema, self.alias())
    }

    /// Materialization, if configured
    #[must_use]
    pub fn materialization(&self) -> Option<&Materialization> {
        self.config.materialized.as_ref()
    }

    /// Source backed by an external table definition
    #[must_use]
    pub fn is_external_source(&self) -> bool {
        self.external.is_some() && self.resource_type == ResourceType::Source
    }

    /// Whether the node is a seed
    #[must_use]
    pub fn is_seed(&self) -> bool {
        self.resource_type == ResourceType::Seed
    }

    /// Node override first, then the run-wide flag
    #[must_use]
    pub fn should_full_refresh(&self, run_full_refresh: bool) -> bool {
        self.config.full_refresh.unwrap_or(run_full_refresh)
    }

    /// Partitioned by ingestion time
    #[must_use]
    pub fn is_time_ingestion_partitioned(&self) -> bool {
        self.config
            .partition_by
            .as_ref()
            .and_then(|p| p.time_ingestion_partitioning)
            .unwrap_or(false)
    }

    /// Metadata value with config meta taking precedence over node meta
    #[must_use]
    pub fn combined_metadata(&self, key: &str) -> Option<&Value> {
        [&self.config.meta, &self.meta]
            .into_iter()
            .filter_map(|meta| meta.as_ref()?.get(key))
            .find(|v| !v.is_null())
    }

    /// Tags from the node and its config
    pub fn all_tags(&self) -> impl Iterator<Item = &str> {
        self.tags
            .iter()
            .chain(self.config.tags.iter())
            .map(String::as_str)
    }

    /// Path of the defining file on disk
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        match &self.root_path {
            Some(root) => Path::new(root).join(&self.original_file_path),
            None => PathBuf::from(&self.original_file_path),
        }
    }
}

/// A macro entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    /// Defining file
    #[serde(default)]
    pub original_file_path: String,
}

#[derive(Deserialize)]
struct RawManifest {
    nodes: IndexMap<String, Node>,
    #[serde(default)]
    sources: IndexMap<String, Node>,
    #[serde(default)]
    macros: IndexMap<String, Macro>,
}

/// A parsed manifest
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "RawManifest")]
pub struct Manifest {
    /// Models, seeds, snapshots, tests
    pub nodes: IndexMap<String, Arc<Node>>,
    /// Sources
    pub sources: IndexMap<String, Arc<Node>>,
    /// Macros
    pub macros: IndexMap<String, Macro>,
}

fn index_by_id(nodes: impl IntoIterator<Item = Node>) -> IndexMap<String, Arc<Node>> {
    nodes
        .into_iter()
        .map(|n| (n.unique_id.clone(), Arc::new(n)))
        .collect()
}

impl From<RawManifest> for Manifest {
    fn from(raw: RawManifest) -> Self {
        Self {
            nodes: raw.nodes.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            sources: raw.sources.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            macros: raw.macros,
        }
    }
}

impl Manifest {
    /// Build a manifest from nodes and sources
    #[must_use]
    pub fn new(nodes: impl IntoIterator<Item = Node>, sources: impl IntoIterator<Item = Node>) -> Self {
        Self {
            nodes: index_by_id(nodes),
            sources: index_by_id(sources),
            macros: IndexMap::new(),
        }
    }

    /// Parse a manifest from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the document does not decode
    pub fn from_json(path: &str, json: &str) -> PlanResult<Self> {
        serde_json::from_str(json).map_err(|e| PlanError::ManifestLoad {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Load a manifest from disk
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, unreadable or malformed
    pub fn from_path(path: impl AsRef<Path>) -> PlanResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let json = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PlanError::ManifestNotFound {
                path: display.clone(),
            },
            _ => PlanError::ManifestLoad {
                path: display.clone(),
                reason: e.to_string(),
            },
        })?;
        Self::from_json(&display, &json)
    }

    /// Nodes followed by sources
    pub fn all_nodes(&self) -> impl Iterator<Item = (&String, &Arc<Node>)> {
        self.nodes.iter().chain(self.sources.iter())
    }

    /// Look up a node or source
    #[must_use]
    pub fn get(&self, unique_id: &str) -> Option<&Arc<Node>> {
        self.nodes.get(unique_id).or_else(|| self.sources.get(unique_id))
    }

    /// Total number of nodes and sources
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() + self.sources.len()
    }

    /// Whether the manifest has no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
