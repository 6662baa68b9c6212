use chrono::NaiveDate;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::query::{QueryAs, QueryScalar};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    U64(u64),
    String(String),
    Date(NaiveDate),
    Bool(bool),
}

/// ===============================
/// Dynamic WHERE clause container
/// ===============================
#[derive(Debug, Clone, Default)]
pub struct SqlFilter {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl SqlFilter {
    /// Starts a clause that always holds, so every condition can be ANDed on.
    pub fn new() -> Self {
        Self {
            sql: String::from(" WHERE 1=1"),
            values: Vec::new(),
        }
    }

    /// `clause` must contain exactly one `?`.
    pub fn and(&mut self, clause: &str, value: SqlValue) -> &mut Self {
        self.sql.push_str(" AND ");
        self.sql.push_str(clause);
        self.values.push(value);
        self
    }

    pub fn and_in(&mut self, column: &str, values: Vec<SqlValue>) -> &mut Self {
        if values.is_empty() {
            self.sql.push_str(" AND 1=0");
            return self;
        }
        self.sql
            .push_str(&format!(" AND {} IN ({})", column, placeholders(values.len())));
        self.values.extend(values);
        self
    }
}

/// `?, ?, ?` for an IN list of `n` values.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// ===============================
/// Bind filter values onto queries
/// ===============================
pub fn bind_query_as<'q, O>(
    mut query: QueryAs<'q, MySql, O, MySqlArguments>,
    values: Vec<SqlValue>,
) -> QueryAs<'q, MySql, O, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::U64(v) => query.bind(v),
            SqlValue::String(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
        };
    }
    query
}

pub fn bind_scalar<'q, O>(
    mut query: QueryScalar<'q, MySql, O, MySqlArguments>,
    values: Vec<SqlValue>,
) -> QueryScalar<'q, MySql, O, MySqlArguments> {
    for value in values {
        query = match value {
            SqlValue::U64(v) => query.bind(v),
            SqlValue::String(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
        };
    }
    query
}
