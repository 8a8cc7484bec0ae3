//! Query expression evaluation for in-memory document filtering.
//!
//! Filters arrive as MongoDB filter documents, are parsed into
//! [`Expr`](latchdb_core::query::Expr) trees and evaluated here. Field paths may be
//! dotted, and arrays met along the path are searched element by element, the way
//! MongoDB matches embedded arrays.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use latchdb_core::{
    error::{DataAccessError, DataResult},
    query::{Expr, FieldOp, QueryVisitor, parse_filter},
};

/// Comparable representation of BSON values.
///
/// Integers keep their exact value. Mixed integer and float comparisons go through `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null or missing value
    Null,
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(&'a str),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Object id
    ObjectId(ObjectId),
    /// Boolean value
    Bool(bool),
    /// DateTime value
    DateTime(DateTime),
    /// Anything else, compared by raw equality only
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Float(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Position in MongoDB's cross-type sort order.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Int(_) | Comparable::Float(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| self.type_rank().cmp(&other.type_rank()))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Int(a), Comparable::Int(b)) => a == b,
            (Comparable::Int(a), Comparable::Float(b)) | (Comparable::Float(b), Comparable::Int(a)) => {
                *a as f64 == *b
            }
            (Comparable::Float(a), Comparable::Float(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Float(b)) => (*a as f64).partial_cmp(b),
            (Comparable::Float(a), Comparable::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Comparable::Float(a), Comparable::Float(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Collects the values reachable through a dotted path.
///
/// Arrays met before the last segment are expanded, so `"cars.name"` yields the name
/// of every embedded car. A missing path yields nothing.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut current = vec![];
    let mut segments = path.split('.');

    let Some(first) = segments.next() else {
        return current;
    };
    current.extend(document.get(first));

    for segment in segments {
        current = current
            .into_iter()
            .flat_map(|value| step(value, segment))
            .collect();
    }

    current
}

fn step<'a>(value: &'a Bson, segment: &str) -> Vec<&'a Bson> {
    match value {
        Bson::Document(doc) => doc.get(segment).into_iter().collect(),
        Bson::Array(items) => match segment.parse::<usize>() {
            Ok(index) => items.get(index).into_iter().collect(),
            Err(_) => items.iter().flat_map(|item| step(item, segment)).collect(),
        },
        _ => vec![],
    }
}

/// The value a sort key sees for a path: the first reachable value, or null.
pub(crate) fn sort_key<'a>(document: &'a Document, path: &str) -> Comparable<'a> {
    lookup(document, path)
        .first()
        .map(|value| Comparable::from(*value))
        .unwrap_or(Comparable::Null)
}

/// Sorts documents by a MongoDB sort document (`{ "field": 1 | -1, ... }`).
pub(crate) fn sort_documents(documents: &mut [Document], sort: &Document) -> DataResult<()> {
    let keys = sort
        .iter()
        .map(|(field, direction)| {
            let descending = match direction {
                Bson::Int32(n) => *n < 0,
                Bson::Int64(n) => *n < 0,
                Bson::Double(n) => *n < 0.0,
                _ => {
                    return Err(DataAccessError::InvalidQuery(format!(
                        "sort direction for {field} must be 1 or -1"
                    )));
                }
            };

            Ok((field.as_str(), descending))
        })
        .collect::<DataResult<Vec<_>>>()?;

    documents.sort_by(|a, b| {
        keys.iter()
            .map(|(field, descending)| {
                let ordering = sort_key(a, field).sort_cmp(&sort_key(b, field));
                if *descending { ordering.reverse() } else { ordering }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    Ok(())
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DataResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns clones of the documents matching a MongoDB filter document.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> DataResult<Vec<Document>> {
        let expr = parse_filter(filter)?;
        let mut matched = vec![];

        for document in documents {
            if DocumentEvaluator::new(document).evaluate(&expr)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    /// Equality the way MongoDB applies it: a missing field equals null and an
    /// array field equals any of its elements.
    fn equals(&self, field: &str, value: &Bson) -> bool {
        let wanted = Comparable::from(value);
        let found = lookup(self.document, field);

        if found.is_empty() {
            return wanted == Comparable::Null;
        }

        found.into_iter().any(|candidate| {
            let candidate = Comparable::from(candidate);
            candidate == wanted
                || matches!(&candidate, Comparable::Array(items) if items.iter().any(|item| *item == wanted))
        })
    }

    fn compares(&self, field: &str, value: &Bson, accept: fn(Ordering) -> bool) -> bool {
        let wanted = Comparable::from(value);

        lookup(self.document, field)
            .into_iter()
            .flat_map(|candidate| match candidate {
                Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .any(|candidate| {
                Comparable::from(candidate)
                    .partial_cmp(&wanted)
                    .is_some_and(accept)
            })
    }

    fn any_of(&self, field: &str, values: &Bson) -> DataResult<bool> {
        match values {
            Bson::Array(values) => Ok(values.iter().any(|value| self.equals(field, value))),
            _ => Err(DataAccessError::InvalidQuery(format!("$in on {field} requires an array"))),
        }
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DataAccessError;

    fn visit_and(&mut self, exprs: &[Expr]) -> DataResult<bool> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> DataResult<bool> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> DataResult<bool> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> DataResult<bool> {
        Ok(!lookup(self.document, field).is_empty() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> DataResult<bool> {
        Ok(match op {
            FieldOp::Eq => self.equals(field, value),
            FieldOp::Ne => !self.equals(field, value),
            FieldOp::Gt => self.compares(field, value, Ordering::is_gt),
            FieldOp::Gte => self.compares(field, value, Ordering::is_ge),
            FieldOp::Lt => self.compares(field, value, Ordering::is_lt),
            FieldOp::Lte => self.compares(field, value, Ordering::is_le),
            FieldOp::AnyOf => self.any_of(field, value)?,
            FieldOp::NoneOf => !self.any_of(field, value)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(document: &Document, filter: Document) -> bool {
        !DocumentEvaluator::filter_documents([document], &filter)
            .unwrap()
            .is_empty()
    }

    #[test]
    fn large_integers_compare_exactly() {
        let car = doc! { "carId": 6330682874475319296_i64 };

        assert!(matches(&car, doc! { "carId": 6330682874475319296_i64 }));
        assert!(!matches(&car, doc! { "carId": 6330682874475319297_i64 }));
        assert!(matches(&doc! { "price": 15 }, doc! { "price": 15.0 }));
    }

    #[test]
    fn dotted_paths_reach_embedded_documents_and_arrays() {
        let car = doc! {
            "remark": { "remark1": 7_i64 },
            "owners": [{ "name": "ann" }, { "name": "bob" }],
        };

        assert!(matches(&car, doc! { "remark.remark1": 7_i64 }));
        assert!(matches(&car, doc! { "owners.name": "bob" }));
        assert!(matches(&car, doc! { "owners.1.name": "bob" }));
        assert!(!matches(&car, doc! { "owners.0.name": "bob" }));
    }

    #[test]
    fn missing_fields_equal_null() {
        let car = doc! { "name": "civic" };

        assert!(matches(&car, doc! { "owner": Bson::Null }));
        assert!(matches(&car, doc! { "owner": { "$ne": "ann" } }));
        assert!(matches(&car, doc! { "owner": { "$exists": false } }));
        assert!(!matches(&car, doc! { "owner": { "$gt": 1 } }));
    }

    #[test]
    fn array_fields_match_elements() {
        let car = doc! { "tags": ["fast", "red"], "scores": [3, 9] };

        assert!(matches(&car, doc! { "tags": "red" }));
        assert!(matches(&car, doc! { "tags": { "$in": ["blue", "fast"] } }));
        assert!(matches(&car, doc! { "tags": { "$nin": ["blue"] } }));
        assert!(matches(&car, doc! { "scores": { "$gt": 8 } }));
        assert!(!matches(&car, doc! { "scores": { "$gt": 9 } }));
    }

    #[test]
    fn logical_operators_combine() {
        let car = doc! { "name": "civic", "year": 2015 };

        assert!(matches(&car, doc! { "$or": [{ "name": "accord" }, { "year": { "$gte": 2010 } }] }));
        assert!(!matches(&car, doc! { "$nor": [{ "name": "civic" }] }));
        assert!(matches(&car, doc! { "year": { "$not": { "$lt": 2000 } } }));
    }

    #[test]
    fn sorts_by_several_keys_and_type_rank() {
        let mut docs = vec![
            doc! { "make": "honda", "year": 2010 },
            doc! { "make": "bmw", "year": 2018 },
            doc! { "make": "honda", "year": 2020 },
            doc! { "year": 1999 },
        ];

        sort_documents(&mut docs, &doc! { "make": 1, "year": -1 }).unwrap();

        let order = docs
            .iter()
            .map(|d| d.get_i32("year").unwrap())
            .collect::<Vec<_>>();
        assert_eq!(order, vec![1999, 2018, 2020, 2010]);
    }
}
