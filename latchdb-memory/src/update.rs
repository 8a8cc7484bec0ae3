//! Update documents applied to stored documents.
//!
//! Supports `$set`, `$unset`, `$inc` and `$setOnInsert` with dotted paths, and plain
//! replacement documents (no operator keys), which keep the stored `_id`.

use bson::{Bson, Document};

use latchdb_core::error::{DataAccessError, DataResult};

/// Applies `update` to `target`. `inserting` enables `$setOnInsert`.
///
/// Returns whether `target` changed.
pub(crate) fn apply_update(target: &mut Document, update: &Document, inserting: bool) -> DataResult<bool> {
    let operators = update.keys().filter(|key| key.starts_with('$')).count();

    if operators == 0 {
        return Ok(replace(target, update));
    }
    if operators != update.len() {
        return Err(invalid("update mixes operators and plain fields"));
    }

    let before = target.clone();

    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(invalid(format!("{operator} requires a document")));
        };

        match operator.as_str() {
            "$set" => set_all(target, fields)?,
            "$setOnInsert" if inserting => set_all(target, fields)?,
            "$setOnInsert" => {}
            "$unset" => {
                for path in fields.keys() {
                    remove_path(target, path);
                }
            }
            "$inc" => {
                for (path, amount) in fields {
                    increment(target, path, amount)?;
                }
            }
            other => return Err(invalid(format!("unsupported update operator {other}"))),
        }
    }

    Ok(*target != before)
}

fn replace(target: &mut Document, replacement: &Document) -> bool {
    let mut next = Document::new();
    if let Some(id) = target.get("_id") {
        next.insert("_id", id.clone());
    }
    for (key, value) in replacement {
        if key != "_id" {
            next.insert(key.clone(), value.clone());
        }
    }

    let changed = *target != next;
    *target = next;

    changed
}

fn set_all(target: &mut Document, fields: &Document) -> DataResult<()> {
    for (path, value) in fields {
        if path == "_id" && target.get("_id").is_some_and(|id| id != value) {
            return Err(invalid("_id is immutable"));
        }
        set_path(target, path, value.clone())?;
    }

    Ok(())
}

/// Sets a dotted path, creating intermediate documents as needed.
pub(crate) fn set_path(target: &mut Document, path: &str, value: Bson) -> DataResult<()> {
    match path.split_once('.') {
        None => {
            target.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = target
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));

            match child {
                Bson::Document(child) => set_path(child, rest, value),
                _ => Err(invalid(format!("cannot set {path}: {head} is not a document"))),
            }
        }
    }
}

fn remove_path(target: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            target.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = target.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

fn get_path<'a>(target: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        None => target.get(path),
        Some((head, rest)) => match target.get(head) {
            Some(Bson::Document(child)) => get_path(child, rest),
            _ => None,
        },
    }
}

fn increment(target: &mut Document, path: &str, amount: &Bson) -> DataResult<()> {
    let current = get_path(target, path).cloned().unwrap_or(Bson::Int32(0));

    let sum = match (&current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b))),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).wrapping_add(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.wrapping_add(i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.wrapping_add(*b)),
        (a, b) => match (as_f64(a), as_f64(b)) {
            (Some(a), Some(b)) => Bson::Double(a + b),
            _ => return Err(invalid(format!("$inc on {path} requires numeric values"))),
        },
    };

    set_path(target, path, sum)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn invalid(message: impl Into<String>) -> DataAccessError {
    DataAccessError::InvalidQuery(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn set_and_unset_follow_dotted_paths() {
        let mut car = doc! { "_id": 1, "name": "civic", "remark": { "a": 1 } };

        let changed = apply_update(
            &mut car,
            &doc! { "$set": { "name": "BMW", "remark.b": 2 }, "$unset": { "remark.a": "" } },
            false,
        )
        .unwrap();

        assert!(changed);
        assert_eq!(car, doc! { "_id": 1, "name": "BMW", "remark": { "b": 2 } });
    }

    #[test]
    fn unchanged_documents_report_no_modification() {
        let mut car = doc! { "name": "civic" };

        assert!(!apply_update(&mut car, &doc! { "$set": { "name": "civic" } }, false).unwrap());
    }

    #[test]
    fn set_on_insert_applies_only_when_inserting() {
        let mut existing = doc! { "name": "civic" };
        let mut fresh = doc! {};
        let update = doc! { "$set": { "name": "civic" }, "$setOnInsert": { "created": 5 } };

        apply_update(&mut existing, &update, false).unwrap();
        apply_update(&mut fresh, &update, true).unwrap();

        assert!(!existing.contains_key("created"));
        assert_eq!(fresh.get_i32("created").unwrap(), 5);
    }

    #[test]
    fn increments_numbers_and_starts_missing_fields_at_zero() {
        let mut car = doc! { "price": 10, "rating": 1.5 };

        apply_update(
            &mut car,
            &doc! { "$inc": { "price": 5, "rating": 1, "views": 1 } },
            false,
        )
        .unwrap();

        assert_eq!(car, doc! { "price": 15, "rating": 2.5, "views": 1 });
        assert!(apply_update(&mut car, &doc! { "$inc": { "name": 1 } }, false).is_ok());
        assert!(apply_update(&mut doc! { "name": "x" }, &doc! { "$inc": { "name": 1 } }, false).is_err());
    }

    #[test]
    fn replacement_keeps_the_id() {
        let mut car = doc! { "_id": 7, "name": "civic", "price": 1 };

        apply_update(&mut car, &doc! { "name": "accord" }, false).unwrap();

        assert_eq!(car, doc! { "_id": 7, "name": "accord" });
    }

    #[test]
    fn rejects_unsupported_or_mixed_updates() {
        let mut car = doc! { "_id": 1 };

        assert!(apply_update(&mut car, &doc! { "$push": { "tags": "x" } }, false).is_err());
        assert!(apply_update(&mut car, &doc! { "$set": { "a": 1 }, "b": 2 }, false).is_err());
        assert!(apply_update(&mut car, &doc! { "$set": { "_id": 2 } }, false).is_err());
    }
}
