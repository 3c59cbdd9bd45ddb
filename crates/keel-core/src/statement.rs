//! Statements and the named-parameter binder.
//!
//! Templates use `:name` placeholders. [`prepare`] rewrites them into the
//! backend's convention, `?` or `$N`, and flattens the parameter map into
//! an ordered argument list.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{CoreError, Result};
use crate::value::{ToValue, Value};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\w+").expect("Invalid placeholder regex"));

/// An SQL template with named parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    /// Template text.
    pub sql: String,
    /// Parameter values keyed by placeholder name, without the colon.
    pub params: BTreeMap<String, Value>,
}

impl Statement {
    /// Creates a statement without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: BTreeMap::new(),
        }
    }

    /// Binds a parameter, builder style.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl ToValue) -> Self {
        self.params.insert(name.into(), value.to_value());
        self
    }

    /// Binds a parameter in place.
    pub fn bind_value(&mut self, name: impl Into<String>, value: Value) {
        self.params.insert(name.into(), value);
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A statement ready for the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    /// Query text with positional placeholders.
    pub sql: String,
    /// Arguments in placeholder order.
    pub args: Vec<Value>,
}

/// Collapses line breaks and indentation into single spaces.
fn normalize(sql: &str) -> String {
    sql.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rewrites named placeholders into positional ones.
///
/// Each occurrence is replaced left to right by `?` or, when `numbered`,
/// by `$N` with `N` counting arguments. A [`Value::List`] expands to one
/// placeholder per element joined by `", "`. Placeholders without a bound
/// value are left as they are.
///
/// # Errors
///
/// Returns [`CoreError::BlankQuery`] if the template is empty after
/// whitespace normalization.
pub fn prepare(statement: &Statement, numbered: bool) -> Result<Prepared> {
    let sql = normalize(&statement.sql);
    if sql.is_empty() {
        return Err(CoreError::BlankQuery);
    }

    let mut args = Vec::new();
    let next = |value: Value, args: &mut Vec<Value>| {
        args.push(value);
        if numbered {
            format!("${}", args.len())
        } else {
            "?".to_string()
        }
    };

    let rendered = PLACEHOLDER.replace_all(&sql, |caps: &Captures<'_>| {
        let token = &caps[0];
        match statement.params.get(&token[1..]) {
            Some(Value::List(items)) => items
                .iter()
                .map(|item| next(item.clone(), &mut args))
                .collect::<Vec<_>>()
                .join(", "),
            Some(value) => next(value.clone(), &mut args),
            None => token.to_string(),
        }
    });

    Ok(Prepared {
        sql: rendered.into_owned(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unnumbered_placeholders() {
        let stmt = Statement::new("SELECT * FROM t WHERE a = :a AND b = :b")
            .bind("a", 1_i64)
            .bind("b", "x");
        let prepared = prepare(&stmt, false).unwrap();
        assert_eq!(prepared.sql, "SELECT * FROM t WHERE a = ? AND b = ?");
        assert_eq!(prepared.args, vec![Value::Int(1), Value::Text("x".into())]);
    }

    #[test]
    fn test_numbered_placeholders_follow_occurrence_order() {
        let stmt = Statement::new("UPDATE t SET b = :b WHERE a = :a AND c = :b")
            .bind("a", 1_i64)
            .bind("b", 2_i64);
        let prepared = prepare(&stmt, true).unwrap();
        assert_eq!(prepared.sql, "UPDATE t SET b = $1 WHERE a = $2 AND c = $3");
        assert_eq!(
            prepared.args,
            vec![Value::Int(2), Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn test_list_expansion() {
        let stmt = Statement::new("SELECT * FROM t WHERE id IN (:ids) AND k = :k")
            .bind("ids", Value::list([3_i64, 4, 5]))
            .bind("k", "v");
        let unnumbered = prepare(&stmt, false).unwrap();
        assert_eq!(
            unnumbered.sql,
            "SELECT * FROM t WHERE id IN (?, ?, ?) AND k = ?"
        );
        let numbered = prepare(&stmt, true).unwrap();
        assert_eq!(
            numbered.sql,
            "SELECT * FROM t WHERE id IN ($1, $2, $3) AND k = $4"
        );
        assert_eq!(numbered.args.len(), 4);
        assert_eq!(numbered.args[0], Value::Int(3));
    }

    #[test]
    fn test_unknown_placeholder_left_untouched() {
        let stmt = Statement::new("SELECT :missing, :a").bind("a", true);
        let prepared = prepare(&stmt, true).unwrap();
        assert_eq!(prepared.sql, "SELECT :missing, $1");
        assert_eq!(prepared.args, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_whitespace_normalization() {
        let stmt = Statement::new(
            "
            SELECT a
              FROM t
            WHERE a = :a
            ",
        )
        .bind("a", 1_i64);
        let prepared = prepare(&stmt, false).unwrap();
        assert_eq!(prepared.sql, "SELECT a FROM t WHERE a = ?");
    }

    #[test]
    fn test_blank_query() {
        assert!(matches!(
            prepare(&Statement::new("  \n\t  "), false),
            Err(CoreError::BlankQuery)
        ));
    }
}
