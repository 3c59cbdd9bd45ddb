//! Queries, predicate trees and query modifiers.
//!
//! A repository builds one base [`Query`] per entity type and specializes it
//! per call through [`QueryModifier`]s. Predicates are [`Condition`] trees;
//! every compared value travels as a named statement parameter.

use std::fmt;
use std::marker::PhantomData;

use crate::statement::Statement;
use crate::value::{ToValue, Value};

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
    /// Pattern match (LIKE)
    Like,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "="),
            Self::Ne => write!(f, "!="),
            Self::Gt => write!(f, ">"),
            Self::Gte => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Lte => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
        }
    }
}

/// A logical predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column op value`
    Compare {
        /// Column name.
        column: String,
        /// Operator.
        op: CompareOp,
        /// Compared value.
        value: Value,
    },
    /// `column IN (values)`
    In {
        /// Column name.
        column: String,
        /// Candidate values.
        values: Vec<Value>,
    },
    /// `column IS NULL`
    IsNull(String),
    /// `column IS NOT NULL`
    IsNotNull(String),
    /// All children hold.
    And(Vec<Condition>),
    /// Any child holds.
    Or(Vec<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    /// Creates a comparison.
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl ToValue) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.to_value(),
        }
    }

    /// Combines with another condition using AND, flattening nested ANDs.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut children) => {
                children.push(other);
                Self::And(children)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Combines with another condition using OR, flattening nested ORs.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut children) => {
                children.push(other);
                Self::Or(children)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Negates this condition.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Renders the predicate into `statement`'s parameters and returns the
    /// SQL text. Parameter names are `w<N>`, numbered from `counter`.
    pub fn render(
        &self,
        quote: &dyn Fn(&str) -> String,
        statement: &mut Statement,
        counter: &mut usize,
    ) -> String {
        match self {
            Self::Compare { column, op, value } => {
                let placeholder = param(value.clone(), statement, counter);
                format!("{} {op} {placeholder}", quote(column))
            }
            // No backend accepts `IN ()`; an empty list matches nothing.
            Self::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
            Self::In { column, values } => {
                let placeholder = param(Value::List(values.clone()), statement, counter);
                format!("{} IN ({placeholder})", quote(column))
            }
            Self::IsNull(column) => format!("{} IS NULL", quote(column)),
            Self::IsNotNull(column) => format!("{} IS NOT NULL", quote(column)),
            Self::And(children) => join(children, " AND ", quote, statement, counter),
            Self::Or(children) => join(children, " OR ", quote, statement, counter),
            Self::Not(inner) => format!("NOT ({})", inner.render(quote, statement, counter)),
        }
    }
}

fn param(value: Value, statement: &mut Statement, counter: &mut usize) -> String {
    *counter += 1;
    let name = format!("w{counter}");
    statement.bind_value(name.clone(), value);
    format!(":{name}")
}

fn join(
    children: &[Condition],
    separator: &str,
    quote: &dyn Fn(&str) -> String,
    statement: &mut Statement,
    counter: &mut usize,
) -> String {
    match children {
        [] => "1 = 1".to_string(),
        [only] => only.render(quote, statement, counter),
        _ => {
            let parts: Vec<String> = children
                .iter()
                .map(|child| format!("({})", child.render(quote, statement, counter)))
                .collect();
            parts.join(separator)
        }
    }
}

/// LIMIT/OFFSET pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Maximum number of rows.
    pub count: u64,
    /// Rows to skip.
    pub offset: u64,
}

/// A SELECT over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Selected columns.
    pub columns: Vec<String>,
    /// Source table.
    pub table: String,
    /// Optional predicate.
    pub filter: Option<Condition>,
    /// Optional limit.
    pub limit: Option<Limit>,
}

impl Query {
    /// Creates an unfiltered query.
    #[must_use]
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            table: table.into(),
            filter: None,
            limit: None,
        }
    }

    /// ANDs `condition` onto the current filter.
    #[must_use]
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Replaces the limit.
    #[must_use]
    pub const fn with_limit(mut self, count: u64, offset: u64) -> Self {
        self.limit = Some(Limit { count, offset });
        self
    }
}

/// A composable transformation applied to a base query.
pub struct QueryModifier(Box<dyn FnOnce(Query) -> Query + Send>);

impl QueryModifier {
    /// Wraps an arbitrary transformation.
    pub fn new(f: impl FnOnce(Query) -> Query + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// ANDs `condition` onto the query's filter.
    #[must_use]
    pub fn additional_where(condition: Condition) -> Self {
        Self::new(move |query| query.and_where(condition))
    }

    /// Overrides the query's limit and offset.
    #[must_use]
    pub fn limit(count: u64, offset: u64) -> Self {
        Self::new(move |query| query.with_limit(count, offset))
    }

    /// Applies the transformation.
    #[must_use]
    pub fn apply(self, query: Query) -> Query {
        (self.0)(query)
    }
}

impl fmt::Debug for QueryModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueryModifier")
    }
}

/// A typed handle to one column of entity `E` holding values of type `V`.
///
/// Handles are handed out by the repository after checking the column
/// exists, so predicates built from them never name unknown columns.
pub struct Column<E, V> {
    name: String,
    _marker: PhantomData<fn() -> (E, V)>,
}

impl<E, V> Clone for Column<E, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E, V> fmt::Debug for Column<E, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Column").field(&self.name).finish()
    }
}

impl<E, V: ToValue> Column<E, V> {
    /// Creates a handle. Prefer the repository's checked constructor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _marker: PhantomData,
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, op: CompareOp, value: impl Into<V>) -> Condition {
        Condition::compare(self.name.clone(), op, value.into())
    }

    /// `column = value`
    pub fn eq(&self, value: impl Into<V>) -> Condition {
        self.compare(CompareOp::Eq, value)
    }

    /// `column != value`
    pub fn ne(&self, value: impl Into<V>) -> Condition {
        self.compare(CompareOp::Ne, value)
    }

    /// `column > value`
    pub fn gt(&self, value: impl Into<V>) -> Condition {
        self.compare(CompareOp::Gt, value)
    }

    /// `column >= value`
    pub fn gte(&self, value: impl Into<V>) -> Condition {
        self.compare(CompareOp::Gte, value)
    }

    /// `column < value`
    pub fn lt(&self, value: impl Into<V>) -> Condition {
        self.compare(CompareOp::Lt, value)
    }

    /// `column <= value`
    pub fn lte(&self, value: impl Into<V>) -> Condition {
        self.compare(CompareOp::Lte, value)
    }

    /// `column LIKE pattern`
    pub fn like(&self, pattern: impl Into<String>) -> Condition {
        Condition::compare(self.name.clone(), CompareOp::Like, pattern.into())
    }

    /// `column IN (values)`
    pub fn is_in<I>(&self, values: I) -> Condition
    where
        I: IntoIterator,
        I::Item: Into<V>,
    {
        Condition::In {
            column: self.name.clone(),
            values: values.into_iter().map(|v| v.into().to_value()).collect(),
        }
    }

    /// `column IS NULL`
    #[must_use]
    pub fn is_null(&self) -> Condition {
        Condition::IsNull(self.name.clone())
    }

    /// `column IS NOT NULL`
    #[must_use]
    pub fn is_not_null(&self) -> Condition {
        Condition::IsNotNull(self.name.clone())
    }
}
