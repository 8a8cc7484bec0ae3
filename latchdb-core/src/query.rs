//! Filter expressions, sort specifications and their MongoDB document forms.
//!
//! Data operations take selectors, queries and updates as plain `bson::Document`s in
//! MongoDB syntax. This module offers a typed alternative for building them, and the
//! other direction: parsing a filter document back into an [`Expr`] so backends without
//! a native query engine can evaluate it through a [`QueryVisitor`].
//!
//! # Filter Expression API
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - Membership: `any_of`, `none_of`
//! - Existence: `exists`, `not_exists`
//! - Logical: `and`, `or`, plus [`Expr::not`]
//!
//! ```ignore
//! use latchdb::query::{Filter, to_document};
//!
//! let selector = to_document(&Filter::eq("carId", 7).and(Filter::gt("year", 2010)))?;
//! ```

use bson::{Bson, Document, doc};

use crate::error::{DataAccessError, DataResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    fn as_bson(self) -> Bson {
        match self {
            SortDirection::Asc => Bson::Int32(1),
            SortDirection::Desc => Bson::Int32(-1),
        }
    }
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Parses a sort key: `"name"` sorts ascending, `"-name"` descending.
    ///
    /// Returns `None` for an empty key.
    pub fn parse(key: &str) -> Option<Self> {
        let key = key.trim();
        let (field, direction) = match key.strip_prefix('-') {
            Some(field) => (field, SortDirection::Desc),
            None => (key.strip_prefix('+').unwrap_or(key), SortDirection::Asc),
        };

        if field.is_empty() {
            return None;
        }

        Some(Sort { field: field.to_string(), direction })
    }
}

/// Builds a MongoDB sort document from sort keys, keeping their order.
///
/// Returns `None` when no usable key was given.
pub fn sort_document<S: AsRef<str>>(keys: &[S]) -> Option<Document> {
    let sort = keys
        .iter()
        .filter_map(|key| Sort::parse(key.as_ref()))
        .fold(Document::new(), |mut sort, key| {
            sort.insert(key.field, key.direction.as_bson());
            sort
        });

    (!sort.is_empty()).then_some(sort)
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (exact match, or array membership for array fields).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Field equals any of the listed values.
    AnyOf,
    /// Field equals none of the listed values.
    NoneOf,
}

impl FieldOp {
    /// The MongoDB operator keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            FieldOp::Eq => "$eq",
            FieldOp::Ne => "$ne",
            FieldOp::Gt => "$gt",
            FieldOp::Gte => "$gte",
            FieldOp::Lt => "$lt",
            FieldOp::Lte => "$lte",
            FieldOp::AnyOf => "$in",
            FieldOp::NoneOf => "$nin",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::AnyOf,
            "$nin" => FieldOp::NoneOf,
            _ => return None,
        })
    }
}

/// A filter expression for querying documents.
///
/// Field names may be dotted paths into embedded documents (`"owner.name"`).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match). An empty list matches everything.
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// An expression that matches every document.
    pub fn all() -> Self {
        Expr::And(vec![])
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Helper struct for constructing filter expressions.
///
/// # Example
///
/// ```ignore
/// use latchdb::query::Filter;
///
/// let expr = Filter::eq("name", "civic")
///     .and(Filter::gt("year", 2010));
/// ```
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the field is present.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Matches documents where the field is missing.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// All expressions must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any expression must match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the values.
    pub fn any_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        let values = values.into_iter().map(Into::into).collect::<Vec<Bson>>();
        Expr::field(field.into(), FieldOp::AnyOf, Bson::Array(values))
    }

    /// Matches documents where the field equals none of the values.
    pub fn none_of<V: Into<Bson>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Expr {
        let values = values.into_iter().map(Into::into).collect::<Vec<Bson>>();
        Expr::field(field.into(), FieldOp::NoneOf, Bson::Array(values))
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DataAccessError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
        }
    }
}

/// Translates filter expressions into MongoDB filter documents.
pub struct DocumentTranslator;

impl QueryVisitor for DocumentTranslator {
    type Output = Document;
    type Error = DataAccessError;

    fn visit_and(&mut self, exprs: &[Expr]) -> DataResult<Document> {
        if exprs.is_empty() {
            return Ok(Document::new());
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<DataResult<Vec<_>>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> DataResult<Document> {
        if exprs.is_empty() {
            return Err(DataAccessError::InvalidQuery("$or needs at least one expression".to_string()));
        }

        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<DataResult<Vec<_>>>()?,
        })
    }

    // MongoDB has no top-level $not, a single-element $nor is equivalent.
    fn visit_not(&mut self, expr: &Expr) -> DataResult<Document> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> DataResult<Document> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> DataResult<Document> {
        if matches!(op, FieldOp::AnyOf | FieldOp::NoneOf) && !matches!(value, Bson::Array(_)) {
            return Err(DataAccessError::InvalidQuery(format!(
                "{} on {field} requires an array",
                op.keyword()
            )));
        }

        let mut condition = Document::new();
        condition.insert(op.keyword(), value.clone());

        Ok(doc! { field: condition })
    }
}

/// Translates a filter expression into a MongoDB filter document.
pub fn to_document(expr: &Expr) -> DataResult<Document> {
    DocumentTranslator.visit_expr(expr)
}

/// Parses a MongoDB filter document into an expression.
///
/// Supports implicit equality, `$eq $ne $gt $gte $lt $lte $in $nin $exists $not` on
/// fields and `$and $or $nor` at any level. An empty document matches everything.
///
/// # Errors
///
/// Returns [`DataAccessError::InvalidQuery`] for unsupported operators or malformed operands.
pub fn parse_filter(filter: &Document) -> DataResult<Expr> {
    let mut exprs = filter
        .iter()
        .map(|(key, value)| parse_entry(key, value))
        .collect::<DataResult<Vec<_>>>()?;

    Ok(match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    })
}

fn parse_entry(key: &str, value: &Bson) -> DataResult<Expr> {
    match key {
        "$and" => Ok(Expr::And(parse_clauses(key, value)?)),
        "$or" => Ok(Expr::Or(parse_clauses(key, value)?)),
        "$nor" => Ok(Expr::Or(parse_clauses(key, value)?).not()),
        _ if key.starts_with('$') => Err(unsupported(key)),
        field => match value {
            Bson::Document(ops) if is_operator_document(ops) => parse_operators(field, ops),
            _ => Ok(Expr::field(field.to_string(), FieldOp::Eq, value.clone())),
        },
    }
}

fn parse_clauses(key: &str, value: &Bson) -> DataResult<Vec<Expr>> {
    let clauses = match value {
        Bson::Array(clauses) if !clauses.is_empty() => clauses,
        _ => {
            return Err(DataAccessError::InvalidQuery(format!(
                "{key} requires a non-empty array of documents"
            )));
        }
    };

    clauses
        .iter()
        .map(|clause| match clause {
            Bson::Document(clause) => parse_filter(clause),
            _ => Err(DataAccessError::InvalidQuery(format!(
                "{key} clauses must be documents"
            ))),
        })
        .collect()
}

fn parse_operators(field: &str, ops: &Document) -> DataResult<Expr> {
    let mut exprs = ops
        .iter()
        .map(|(keyword, operand)| match keyword.as_str() {
            "$exists" => Ok(Expr::Exists(field.to_string(), truthy(operand))),
            "$not" => match operand {
                Bson::Document(inner) if is_operator_document(inner) => {
                    Ok(parse_operators(field, inner)?.not())
                }
                _ => Err(DataAccessError::InvalidQuery(format!(
                    "$not on {field} requires an operator document"
                ))),
            },
            "$in" | "$nin" if !matches!(operand, Bson::Array(_)) => Err(
                DataAccessError::InvalidQuery(format!("{keyword} on {field} requires an array")),
            ),
            other => match FieldOp::from_keyword(other) {
                Some(op) => Ok(Expr::field(field.to_string(), op, operand.clone())),
                None => Err(unsupported(other)),
            },
        })
        .collect::<DataResult<Vec<_>>>()?;

    Ok(match exprs.len() {
        1 => exprs.remove(0),
        _ => Expr::And(exprs),
    })
}

fn is_operator_document(document: &Document) -> bool {
    document
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null => false,
        _ => true,
    }
}

fn unsupported(operator: &str) -> DataAccessError {
    DataAccessError::InvalidQuery(format!("unsupported operator {operator}"))
}
