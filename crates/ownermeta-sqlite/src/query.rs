//! Owner collection queries filtered by metadata
//!
//! Each [`MetaFilter`] becomes an `EXISTS` subquery against `meta`, correlated
//! with the owner table on its id column. Filters are AND-combined.
//!
//! ```rust,ignore
//! let adults = MetaQuery::<User>::new()
//!     .where_meta("age", ">=", 18)?
//!     .fetch_ids(&store)?;
//! ```
//!
//! Ordering operators cast both sides to NUMERIC, so integers keep full 64-bit
//! precision and floats compare as REAL. They are only meaningful for values
//! stored as numeric text: other text casts to its leading numeric prefix, or 0.

use crate::meta_store::SqliteMetaStore;
use ownermeta_core::{MetaError, MetaFilter, MetaResult, MetaStore, MetaValue, Operator, OwnerTable};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// Quote an SQL identifier
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Metadata-filtered query over owners of type `T`
pub struct MetaQuery<T: OwnerTable> {
    filters: Vec<MetaFilter>,
    _owner: PhantomData<fn() -> T>,
}

impl<T: OwnerTable> Clone for MetaQuery<T> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            _owner: PhantomData,
        }
    }
}

impl<T: OwnerTable> fmt::Debug for MetaQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaQuery")
            .field("owner_type", &T::OWNER_TYPE)
            .field("filters", &self.filters)
            .finish()
    }
}

impl<T: OwnerTable> Default for MetaQuery<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: OwnerTable> MetaQuery<T> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            _owner: PhantomData,
        }
    }

    /// Owners having a record for at least one of `keys`
    pub fn where_meta_key_exists<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.filters.push(MetaFilter::key_exists(keys));
        self
    }

    /// Owners whose value at `key` compares to `value` under `op`
    ///
    /// # Errors
    ///
    /// [`MetaError::InvalidOperator`] for anything outside
    /// `=, !=, <>, <, <=, >, >=`; nothing is queried in that case.
    pub fn where_meta(
        mut self,
        key: impl Into<String>,
        op: &str,
        value: impl Into<MetaValue>,
    ) -> MetaResult<Self> {
        self.filters.push(MetaFilter::compare(key, op, value)?);
        Ok(self)
    }

    /// Owners whose value at `key` equals `value`
    pub fn where_meta_eq(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetaValue>,
    ) -> MetaResult<Self> {
        self.filters.push(MetaFilter::equals(key, value)?);
        Ok(self)
    }

    /// Add an already built filter
    pub fn filter(mut self, filter: MetaFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[MetaFilter] {
        &self.filters
    }

    /// SQL selecting matching owner ids, with its positional parameters
    pub fn to_sql(&self, realm: &str) -> (String, Vec<Value>) {
        let id_column = format!("o.{}", quote_ident(T::ID_COLUMN));
        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {id} FROM {table} AS o",
            id = id_column,
            table = quote_ident(T::TABLE)
        );

        for (index, filter) in self.filters.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            sql.push_str("EXISTS (SELECT 1 FROM meta AS m WHERE m.realm = ? AND m.owner_type = ? AND m.owner_id = ");
            sql.push_str(&id_column);
            params.push(Value::Text(realm.to_string()));
            params.push(Value::Text(T::OWNER_TYPE.to_string()));

            match filter {
                MetaFilter::KeyExists(keys) if keys.is_empty() => sql.push_str(" AND 0"),
                MetaFilter::KeyExists(keys) => {
                    sql.push_str(" AND m.key IN (");
                    sql.push_str(&vec!["?"; keys.len()].join(", "));
                    sql.push(')');
                    params.extend(keys.iter().cloned().map(Value::Text));
                }
                MetaFilter::Compare { key, op, operand } => {
                    sql.push_str(" AND m.key = ?");
                    params.push(Value::Text(key.clone()));
                    sql.push_str(&comparison_sql(*op));
                    params.push(Value::Text(operand.clone()));
                }
            }
            sql.push(')');
        }

        sql.push_str(&format!(" ORDER BY {}", id_column));
        (sql, params)
    }

    /// Ids of matching owners, ordered by id
    pub fn fetch_ids(&self, store: &SqliteMetaStore) -> MetaResult<Vec<u64>> {
        let (sql, params) = self.to_sql(store.realm());
        debug!(
            owner_type = T::OWNER_TYPE,
            filters = self.filters.len(),
            "Querying owners by meta"
        );

        let ids: Vec<i64> = store.pool().with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params_from_iter(params), |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        })?;

        ids.into_iter()
            .map(|id| {
                u64::try_from(id).map_err(|_| {
                    MetaError::InvalidOwner(format!("{}:{} has a negative id", T::OWNER_TYPE, id))
                })
            })
            .collect()
    }

    /// Number of matching owners
    pub fn count(&self, store: &SqliteMetaStore) -> MetaResult<usize> {
        Ok(self.fetch_ids(store)?.len())
    }
}

/// Value comparison for one operator
///
/// Equality operators compare stored text against the encoded operand.
fn comparison_sql(op: Operator) -> String {
    if op.is_ordering() {
        format!(" AND CAST(m.value AS NUMERIC) {} CAST(? AS NUMERIC)", op.as_str())
    } else {
        let sql_op = match op {
            Operator::Eq => "=",
            _ => "<>",
        };
        format!(" AND m.value {} ?", sql_op)
    }
}
