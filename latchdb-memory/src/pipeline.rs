//! Aggregation pipelines over in-memory collections.
//!
//! Supported stages: `$match`, `$sort`, `$skip`, `$limit`, `$lookup` (equality form),
//! `$unwind` and `$count`.

use bson::{Bson, Document, doc};
use std::collections::HashMap;

use latchdb_core::error::{DataAccessError, DataResult};

use crate::evaluator::{Comparable, DocumentEvaluator, lookup, sort_documents};

pub(crate) fn run_pipeline(
    collections: &HashMap<String, Vec<Document>>,
    collection: &str,
    pipeline: &[Document],
) -> DataResult<Vec<Document>> {
    let mut documents = collections.get(collection).cloned().unwrap_or_default();

    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(invalid("each pipeline stage must have exactly one key"));
        };

        documents = match name.as_str() {
            "$match" => DocumentEvaluator::filter_documents(&documents, document_arg(name, spec)?)?,
            "$sort" => {
                sort_documents(&mut documents, document_arg(name, spec)?)?;
                documents
            }
            "$skip" => documents.into_iter().skip(count_arg(name, spec)?).collect(),
            "$limit" => documents.into_iter().take(count_arg(name, spec)?).collect(),
            "$lookup" => join(collections, documents, document_arg(name, spec)?)?,
            "$unwind" => unwind(documents, spec)?,
            "$count" => match spec {
                Bson::String(field) if !field.is_empty() => {
                    vec![doc! { field.as_str(): documents.len() as i64 }]
                }
                _ => return Err(invalid("$count requires a field name")),
            },
            other => return Err(invalid(format!("unsupported pipeline stage {other}"))),
        };
    }

    Ok(documents)
}

fn join(
    collections: &HashMap<String, Vec<Document>>,
    documents: Vec<Document>,
    spec: &Document,
) -> DataResult<Vec<Document>> {
    let field = |key: &str| {
        spec.get_str(key)
            .map_err(|_| invalid(format!("$lookup requires a string `{key}`")))
    };
    let (from, local, foreign, as_field) = (
        field("from")?,
        field("localField")?,
        field("foreignField")?,
        field("as")?,
    );

    let foreign_documents = collections.get(from).map(Vec::as_slice).unwrap_or_default();

    Ok(documents
        .into_iter()
        .map(|mut document| {
            let joined = {
                let local_keys = join_keys(&document, local);

                foreign_documents
                    .iter()
                    .filter(|candidate| {
                        let foreign_keys = join_keys(candidate, foreign);
                        local_keys
                            .iter()
                            .any(|key| foreign_keys.iter().any(|other| key == other))
                    })
                    .cloned()
                    .map(Bson::Document)
                    .collect::<Vec<_>>()
            };

            document.insert(as_field, Bson::Array(joined));
            document
        })
        .collect())
}

/// Values a document contributes to an equality join. Arrays contribute each element
/// and a missing field joins on null.
fn join_keys<'a>(document: &'a Document, path: &str) -> Vec<Comparable<'a>> {
    let values = lookup(document, path);

    if values.is_empty() {
        return vec![Comparable::Null];
    }

    values
        .into_iter()
        .flat_map(|value| match value {
            Bson::Array(items) => items.iter().map(Comparable::from).collect::<Vec<_>>(),
            other => vec![Comparable::from(other)],
        })
        .collect()
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> DataResult<Vec<Document>> {
    let path = match spec {
        Bson::String(path) => path.as_str(),
        Bson::Document(options) => options
            .get_str("path")
            .map_err(|_| invalid("$unwind requires a `path`"))?,
        _ => return Err(invalid("$unwind requires a field path")),
    };
    let Some(field) = path.strip_prefix('$') else {
        return Err(invalid("$unwind path must start with `$`"));
    };

    Ok(documents
        .into_iter()
        .flat_map(|document| {
            let items = match document.get(field) {
                Some(Bson::Array(items)) => Some(items.clone()),
                Some(Bson::Null) | None => Some(vec![]),
                Some(_) => None,
            };

            match items {
                Some(items) => items
                    .into_iter()
                    .map(|item| {
                        let mut unwound = document.clone();
                        unwound.insert(field, item);
                        unwound
                    })
                    .collect::<Vec<_>>(),
                None => vec![document],
            }
        })
        .collect())
}

fn document_arg<'a>(stage: &str, spec: &'a Bson) -> DataResult<&'a Document> {
    match spec {
        Bson::Document(document) => Ok(document),
        _ => Err(invalid(format!("{stage} requires a document"))),
    }
}

fn count_arg(stage: &str, spec: &Bson) -> DataResult<usize> {
    let count = match spec {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) if n.fract() == 0.0 => *n as i64,
        _ => -1,
    };

    usize::try_from(count).map_err(|_| invalid(format!("{stage} requires a non-negative integer")))
}

fn invalid(message: impl Into<String>) -> DataAccessError {
    DataAccessError::InvalidQuery(message.into())
}
