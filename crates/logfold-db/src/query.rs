//! Parameterized WHERE-clause builder for log filters.
//!
//! [`LogFilter::sql`] emits the canonical projection with operands embedded
//! verbatim; that string keys the filter cache but never reaches a
//! database. This builder produces the real query fragment with bind
//! placeholders, so operand escaping is handled by the driver.

use chrono::{DateTime, Utc};

use logfold_core::LogFilter;

use crate::escape_like;

/// A bind parameter in the order it appears in the generated SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// Placeholder syntax of the target backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Postgres-style `$1`, `$2`, ...
    Dollar,
    /// SQLite-style `?`.
    Question,
}

impl Placeholder {
    fn render(self, index: usize) -> String {
        match self {
            Self::Dollar => format!("${}", index),
            Self::Question => "?".to_string(),
        }
    }
}

/// Result of projecting a filter into a WHERE fragment.
#[derive(Debug, Clone)]
pub struct WhereClause {
    /// The fragment (without the `WHERE` keyword); `TRUE` for the empty
    /// filter.
    pub sql: String,
    /// Bind parameters in placeholder order.
    pub params: Vec<QueryParam>,
    /// Whether a message-regex predicate was pushed into the SQL. When
    /// false and the filter has a message pattern, the caller must apply it
    /// after fetching.
    pub regex_in_sql: bool,
}

/// Project `filter` into a parameterized WHERE fragment.
///
/// The message regex is pushed down only for [`Placeholder::Dollar`]
/// (Postgres `~`); stock SQLite has no regex operator, so that backend
/// filters messages in process after the fetch.
pub fn build_where(filter: &LogFilter, placeholder: Placeholder) -> WhereClause {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    let mut regex_in_sql = false;

    let next = |params: &Vec<QueryParam>| placeholder.render(params.len() + 1);

    if let Some(f) = &filter.level {
        if let Some(level) = &f.eq {
            clauses.push(format!("level = {}", next(&params)));
            params.push(QueryParam::Text(level.to_string()));
        }
    }
    if let Some(f) = &filter.source {
        if let Some(source) = &f.eq {
            clauses.push(format!("source LIKE {} ESCAPE '\\'", next(&params)));
            params.push(QueryParam::Text(format!("%{}%", escape_like(source))));
        }
    }
    if let Some(f) = &filter.group {
        if let Some(group) = &f.eq {
            clauses.push(format!("group_name LIKE {} ESCAPE '\\'", next(&params)));
            params.push(QueryParam::Text(format!("%{}%", escape_like(group))));
        }
    }
    if let Some(f) = &filter.message {
        if let Some(pattern) = &f.eq {
            if placeholder == Placeholder::Dollar {
                clauses.push(format!("message ~ {}", next(&params)));
                params.push(QueryParam::Text(pattern.clone()));
                regex_in_sql = true;
            }
        }
    }
    if let Some(f) = &filter.received_at {
        if let Some(eq) = &f.eq {
            clauses.push(format!("recorded_at = {}", next(&params)));
            params.push(QueryParam::Timestamp(*eq));
        }
        if let Some(le) = &f.le {
            clauses.push(format!("recorded_at <= {}", next(&params)));
            params.push(QueryParam::Timestamp(*le));
        }
        if let Some(ge) = &f.ge {
            clauses.push(format!("recorded_at >= {}", next(&params)));
            params.push(QueryParam::Timestamp(*ge));
        }
    }

    let sql = if clauses.is_empty() {
        "TRUE".to_string()
    } else {
        clauses.join(" AND ")
    };

    WhereClause {
        sql,
        params,
        regex_in_sql,
    }
}
