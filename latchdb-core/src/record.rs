//! Core traits and types for record representation and serialization.
//!
//! This module provides the capability every stored record type implements,
//! the collection-name derivation rule, and the type-erased views used by the
//! dynamic binding path.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};
use std::{any::Any, borrow::Cow};

use crate::error::{DataAccessError, DataResult};

/// Core trait that all records stored through a record store must implement.
///
/// A record knows which collection it lives in and, optionally, how to stamp its
/// own `created`/`updated` timestamps. Nothing is looked up by field name at runtime:
/// a type either overrides the setters or the store leaves its fields alone.
///
/// The trait can be derived with `#[derive(Record)]` from the `latchdb` crate.
///
/// # Example
///
/// ```ignore
/// use latchdb::record::Record;
/// use chrono::{DateTime, Utc};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Car {
///     pub car_id: i64,
///     pub name: String,
///     pub updated: DateTime<Utc>,
///     pub created: DateTime<Utc>,
/// }
///
/// impl Record for Car {
///     fn collection_name() -> Cow<'static, str> {
///         "car".into()
///     }
///
///     fn set_created(&mut self, at: DateTime<Utc>) {
///         self.created = at;
///     }
///
///     fn set_updated(&mut self, at: DateTime<Utc>) {
///         self.updated = at;
///     }
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the name of the collection this record type belongs to.
    ///
    /// Defaults to the snake-cased type name, so `ClubMsg` lives in `club_msg`.
    fn collection_name() -> Cow<'static, str> {
        Cow::Owned(derive_collection_name(std::any::type_name::<Self>()))
    }

    /// Stamps the creation time. Called by inserts.
    fn set_created(&mut self, _at: DateTime<Utc>) {}

    /// Stamps the last-update time. Called by inserts and updates.
    fn set_updated(&mut self, _at: DateTime<Utc>) {}
}

/// Derives a collection name from a Rust type name.
///
/// Module paths and generic arguments are ignored, then the remaining identifier is
/// snake-cased with [`snake_case`].
pub fn derive_collection_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let ident = base.rsplit("::").next().unwrap_or(base);

    snake_case(ident)
}

/// Inserts `_` before every uppercase letter that follows the first non-underscore
/// character, then lower-cases the result.
///
/// `ClubMsg` becomes `club_msg` and `XxYY` becomes `xx_y_y`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() * 2);
    let mut in_word = false;

    for (i, c) in name.chars().enumerate() {
        if i > 0 && in_word && c.is_ascii_uppercase() {
            out.push('_');
        }
        if c != '_' {
            in_word = true;
        }
        out.push(c);
    }

    out.to_lowercase()
}

/// Extension trait providing serialization utilities for records.
///
/// This trait is automatically implemented for all types that implement [`Record`].
pub trait RecordExt: Record {
    /// Encodes this record as a BSON document.
    ///
    /// # Errors
    ///
    /// Returns [`DataAccessError::Serialization`] if the record does not encode to a document.
    fn to_document(&self) -> DataResult<Document>;

    /// Decodes a record from a BSON document.
    fn from_document(document: Document) -> DataResult<Self>;

    /// Converts this record to a JSON value.
    fn to_json(&self) -> DataResult<Value>;

    /// Creates a record from a JSON value.
    fn from_json(value: Value) -> DataResult<Self>;
}

impl<R: Record> RecordExt for R {
    fn to_document(&self) -> DataResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(DataAccessError::Serialization(format!(
                "record {} encodes to {:?}, expected a document",
                std::any::type_name::<R>(),
                other.element_type(),
            ))),
        }
    }

    fn from_document(document: Document) -> DataResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> DataResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DataResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Type-erased record trait that allows working with records of different types uniformly.
///
/// Most users should use the concrete [`Record`] trait. This one backs the
/// `*_any` operations of the record store, where the concrete type is not known
/// to the caller.
pub trait AnyRecord: Send + Sync {
    /// Returns the name of the collection this record belongs to.
    fn record_collection(&self) -> Cow<'static, str>;

    /// Returns the Rust type name of the record.
    fn record_type_name(&self) -> &'static str;

    /// Encodes the record as a BSON document.
    fn encode(&self) -> DataResult<Document>;

    /// Replaces the record's contents with a decoded document.
    fn load(&mut self, document: Document) -> DataResult<()>;

    /// Decodes an independent copy of the record from its own encoding.
    fn duplicate(&self) -> DataResult<Box<dyn AnyRecord>>;

    /// Stamps the creation time.
    fn stamp_created(&mut self, at: DateTime<Utc>);

    /// Stamps the last-update time.
    fn stamp_updated(&mut self, at: DateTime<Utc>);

    /// Returns a reference to the record as a generic `Any` type.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference to the record as a generic `Any` type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn AnyRecord {
    /// Attempts to downcast a reference to a specific record type.
    pub fn downcast_ref<R: Record>(&self) -> Option<&R> {
        self.as_any().downcast_ref::<R>()
    }

    /// Attempts to downcast a mutable reference to a specific record type.
    pub fn downcast_mut<R: Record>(&mut self) -> Option<&mut R> {
        self.as_any_mut().downcast_mut::<R>()
    }
}

impl<R: Record> AnyRecord for R {
    fn record_collection(&self) -> Cow<'static, str> {
        R::collection_name()
    }

    fn record_type_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn encode(&self) -> DataResult<Document> {
        self.to_document()
    }

    fn load(&mut self, document: Document) -> DataResult<()> {
        *self = R::from_document(document)?;

        Ok(())
    }

    fn duplicate(&self) -> DataResult<Box<dyn AnyRecord>> {
        Ok(Box::new(R::from_document(self.to_document()?)?))
    }

    fn stamp_created(&mut self, at: DateTime<Utc>) {
        self.set_created(at);
    }

    fn stamp_updated(&mut self, at: DateTime<Utc>) {
        self.set_updated(at);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Type-erased, growable sequence of records populated by finds and aggregations.
pub trait AnyResultSet: Send + Sync {
    /// Returns the collection name of the element type.
    fn element_collection(&self) -> Cow<'static, str>;

    /// Returns the Rust type name of the element type.
    fn element_type_name(&self) -> &'static str;

    /// Removes every record from the sequence.
    fn clear_records(&mut self);

    /// Decodes a document and appends it.
    fn push_document(&mut self, document: Document) -> DataResult<()>;

    /// Number of records currently held.
    fn record_count(&self) -> usize;
}

impl<R: Record> AnyResultSet for Vec<R> {
    fn element_collection(&self) -> Cow<'static, str> {
        R::collection_name()
    }

    fn element_type_name(&self) -> &'static str {
        std::any::type_name::<R>()
    }

    fn clear_records(&mut self) {
        self.clear();
    }

    fn push_document(&mut self, document: Document) -> DataResult<()> {
        self.push(R::from_document(document)?);

        Ok(())
    }

    fn record_count(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ClubMsg {
        text: String,
    }

    impl Record for ClubMsg {}

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Car {
        name: String,
        #[serde(default)]
        updated: Option<DateTime<Utc>>,
    }

    impl Record for Car {
        fn collection_name() -> Cow<'static, str> {
            "vehicles".into()
        }

        fn set_updated(&mut self, at: DateTime<Utc>) {
            self.updated = Some(at);
        }
    }

    #[test]
    fn derives_snake_case_collection_from_type_name() {
        assert_eq!(ClubMsg::collection_name(), "club_msg");
    }

    #[test]
    fn explicit_collection_name_wins() {
        assert_eq!(Car::collection_name(), "vehicles");
    }

    #[test]
    fn snake_case_follows_interior_uppercase_rule() {
        assert_eq!(snake_case("ClubMsg"), "club_msg");
        assert_eq!(snake_case("XxYY"), "xx_y_y");
        assert_eq!(snake_case("_Foo"), "_foo");
        assert_eq!(snake_case("car"), "car");
        assert_eq!(snake_case("Car_Owner"), "car__owner");
    }

    #[test]
    fn derivation_ignores_paths_and_generics() {
        assert_eq!(derive_collection_name("app::models::ClubMsg"), "club_msg");
        assert_eq!(derive_collection_name("app::Wrapper<app::Car>"), "wrapper");
    }

    #[test]
    fn erased_record_loads_and_stamps_in_place() {
        let mut car = Car { name: "civic".into(), updated: None };
        let erased: &mut dyn AnyRecord = &mut car;

        erased.stamp_updated(Utc::now());
        erased
            .load(bson::doc! { "name": "accord" })
            .unwrap();

        assert_eq!(erased.record_collection(), "vehicles");
        assert_eq!(erased.downcast_ref::<Car>().unwrap().name, "accord");
        assert_eq!(erased.downcast_ref::<Car>().unwrap().updated, None);
    }

    #[test]
    fn non_document_records_fail_to_encode() {
        #[derive(Serialize, Deserialize)]
        struct Counter(i64);

        impl Record for Counter {}

        assert!(matches!(
            Counter(3).to_document(),
            Err(DataAccessError::Serialization(_))
        ));
    }
}
