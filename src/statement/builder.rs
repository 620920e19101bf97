//! Fluent builder for CQL statement text.
//!
//! Assembles `SELECT` / `INSERT` / `UPDATE` / `DELETE` statements with
//! positional `?` markers, collecting the parameter values alongside. Plain
//! template assembly; nothing is validated against a schema.

use thiserror::Error;

use crate::statement::Statement;
use crate::value::CqlValue;

/// Error of [`CqlBuilder::build`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CqlBuildError {
    /// None of `select` / `insert` / `update` / `delete` was called.
    #[error("No statement kind was chosen")]
    MissingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Builder for CQL statements against a single table.
///
/// # Example
///
/// ```
/// use cql_pool::{CqlBuilder, CqlValue};
///
/// let (statement, params) = CqlBuilder::new("user")
///     .update()
///     .set("name", "Luka")
///     .set("age", 30)
///     .where_eq("id", 7_i64)
///     .build()
///     .unwrap();
///
/// assert_eq!(statement.contents, "UPDATE user SET name = ? , age = ? WHERE id = ?;");
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct CqlBuilder {
    table: String,
    kind: Option<Kind>,

    select_fields: Vec<String>,
    select_limit: Option<u64>,

    delete_fields: Vec<String>,

    value_columns: Vec<String>,
    value_params: Vec<CqlValue>,

    set_clauses: Vec<String>,
    set_params: Vec<CqlValue>,

    where_clauses: Vec<String>,
    where_params: Vec<CqlValue>,
}

impl CqlBuilder {
    /// Starts a builder for the given table (column family).
    pub fn new(table: impl Into<String>) -> CqlBuilder {
        CqlBuilder {
            table: table.into(),
            kind: None,
            select_fields: Vec::new(),
            select_limit: None,
            delete_fields: Vec::new(),
            value_columns: Vec::new(),
            value_params: Vec::new(),
            set_clauses: Vec::new(),
            set_params: Vec::new(),
            where_clauses: Vec::new(),
            where_params: Vec::new(),
        }
    }

    /// Makes this a `SELECT *` statement.
    pub fn select(mut self) -> Self {
        self.kind = Some(Kind::Select);
        self
    }

    /// Makes this a `SELECT` of the given fields.
    pub fn select_fields(mut self, fields: &[&str]) -> Self {
        self.kind = Some(Kind::Select);
        self.select_fields = fields.iter().map(|f| (*f).to_owned()).collect();
        self
    }

    /// Makes this an `INSERT` statement.
    pub fn insert(mut self) -> Self {
        self.kind = Some(Kind::Insert);
        self
    }

    /// Makes this an `UPDATE` statement.
    pub fn update(mut self) -> Self {
        self.kind = Some(Kind::Update);
        self
    }

    /// Makes this a whole-row `DELETE` statement.
    pub fn delete(mut self) -> Self {
        self.kind = Some(Kind::Delete);
        self
    }

    /// Makes this a `DELETE` of the given fields.
    pub fn delete_fields(mut self, fields: &[&str]) -> Self {
        self.kind = Some(Kind::Delete);
        self.delete_fields = fields.iter().map(|f| (*f).to_owned()).collect();
        self
    }

    /// Adds a column/value pair of an `INSERT`.
    pub fn value(mut self, column: &str, value: impl Into<CqlValue>) -> Self {
        self.value_columns.push(column.to_owned());
        self.value_params.push(value.into());
        self
    }

    /// Adds a `column = ?` assignment of an `UPDATE`.
    pub fn set(mut self, column: &str, value: impl Into<CqlValue>) -> Self {
        self.set_clauses.push(format!("{column} = ?"));
        self.set_params.push(value.into());
        self
    }

    /// Adds a `column['key'] = ?` assignment updating one entry of a map
    /// column.
    pub fn set_map_field(mut self, column: &str, key: &str, value: impl Into<CqlValue>) -> Self {
        self.set_clauses.push(format!("{column}['{key}'] = ?"));
        self.set_params.push(value.into());
        self
    }

    /// Adds a `column = column + [?]` assignment appending to a list
    /// column.
    pub fn append_list(mut self, column: &str, value: impl Into<CqlValue>) -> Self {
        self.set_clauses.push(format!("{column} = {column} + [?]"));
        self.set_params.push(value.into());
        self
    }

    /// Adds a `column = ?` condition to the `WHERE` clause.
    pub fn where_eq(mut self, column: &str, value: impl Into<CqlValue>) -> Self {
        self.where_clauses.push(format!("{column} = ?"));
        self.where_params.push(value.into());
        self
    }

    /// Adds a `column IN ?` condition to the `WHERE` clause; the values are
    /// bound as a single list parameter.
    pub fn where_in<V: Into<CqlValue>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.where_clauses.push(format!("{column} IN ?"));
        self.where_params
            .push(CqlValue::List(values.into_iter().map(Into::into).collect()));
        self
    }

    /// Limits the number of selected rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.select_limit = Some(limit);
        self
    }

    /// Builds the statement text and its positional parameters.
    pub fn build(self) -> Result<(Statement, Vec<CqlValue>), CqlBuildError> {
        match self.kind {
            Some(Kind::Select) => Ok(self.build_select()),
            Some(Kind::Insert) => Ok(self.build_insert()),
            Some(Kind::Update) => Ok(self.build_update()),
            Some(Kind::Delete) => Ok(self.build_delete()),
            None => Err(CqlBuildError::MissingKind),
        }
    }

    fn build_select(self) -> (Statement, Vec<CqlValue>) {
        let mut query = if self.select_fields.is_empty() {
            format!("SELECT * FROM {}", self.table)
        } else {
            format!("SELECT {} FROM {}", self.select_fields.join(" , "), self.table)
        };
        append_where_clause(&mut query, &self.where_clauses);
        if let Some(limit) = self.select_limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }
        query.push(';');
        (Statement::new(query), self.where_params)
    }

    fn build_insert(self) -> (Statement, Vec<CqlValue>) {
        let marks = vec!["?"; self.value_columns.len()].join(" , ");
        let query = format!(
            "INSERT INTO {} ( {} ) VALUES ( {} );",
            self.table,
            self.value_columns.join(" , "),
            marks
        );
        (Statement::new(query), self.value_params)
    }

    fn build_update(self) -> (Statement, Vec<CqlValue>) {
        let mut query = format!("UPDATE {} SET {}", self.table, self.set_clauses.join(" , "));
        append_where_clause(&mut query, &self.where_clauses);
        query.push(';');
        let mut params = self.set_params;
        params.extend(self.where_params);
        (Statement::new(query), params)
    }

    fn build_delete(self) -> (Statement, Vec<CqlValue>) {
        let mut query = if self.delete_fields.is_empty() {
            format!("DELETE FROM {}", self.table)
        } else {
            format!("DELETE {} FROM {}", self.delete_fields.join(" , "), self.table)
        };
        append_where_clause(&mut query, &self.where_clauses);
        query.push(';');
        (Statement::new(query), self.where_params)
    }
}

fn append_where_clause(query: &mut String, clauses: &[String]) {
    if !clauses.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&clauses.join(" AND "));
    }
}
