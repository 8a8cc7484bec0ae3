//! Record binding: shape validation and collection resolution.
//!
//! Every data operation binds its record (or result sequence) before it touches the
//! pool. Binding checks how the value was handed over and resolves the collection
//! name from the record type. Typed callers pass `&mut R` or `&mut Vec<R>`, which
//! always has the right shape; the erased entry points accept [`RecordArg`] and
//! [`ResultArg`], where the wrong shapes are representable and rejected here.

use std::borrow::Cow;

use crate::{
    error::{DataAccessError, DataResult},
    record::{AnyRecord, AnyResultSet, Record},
};

/// How a record was handed to an erased data operation.
pub enum RecordArg<'a> {
    /// A mutable borrow of a record. The only accepted shape.
    Borrowed(&'a mut dyn AnyRecord),
    /// A record passed by value. Decoded results and timestamps would be lost.
    Owned(Box<dyn AnyRecord>),
    /// A borrow of a boxed record, one indirection too many.
    Boxed(&'a mut Box<dyn AnyRecord>),
}

impl<'a, R: Record> From<&'a mut R> for RecordArg<'a> {
    fn from(record: &'a mut R) -> Self {
        RecordArg::Borrowed(record)
    }
}

impl<'a> From<&'a mut dyn AnyRecord> for RecordArg<'a> {
    fn from(record: &'a mut dyn AnyRecord) -> Self {
        RecordArg::Borrowed(record)
    }
}

impl<'a> From<Box<dyn AnyRecord>> for RecordArg<'a> {
    fn from(record: Box<dyn AnyRecord>) -> Self {
        RecordArg::Owned(record)
    }
}

impl<'a> From<&'a mut Box<dyn AnyRecord>> for RecordArg<'a> {
    fn from(record: &'a mut Box<dyn AnyRecord>) -> Self {
        RecordArg::Boxed(record)
    }
}

/// How a result sequence was handed to an erased find or aggregation.
pub enum ResultArg<'a> {
    /// A mutable borrow of a record sequence. The only accepted shape.
    Borrowed(&'a mut dyn AnyResultSet),
    /// A single record where a sequence was expected.
    Record(&'a mut dyn AnyRecord),
    /// A sequence passed by value.
    Owned(Box<dyn AnyResultSet>),
}

impl<'a, R: Record> From<&'a mut Vec<R>> for ResultArg<'a> {
    fn from(results: &'a mut Vec<R>) -> Self {
        ResultArg::Borrowed(results)
    }
}

impl<'a> From<&'a mut dyn AnyResultSet> for ResultArg<'a> {
    fn from(results: &'a mut dyn AnyResultSet) -> Self {
        ResultArg::Borrowed(results)
    }
}

/// A record that passed validation, together with its collection.
pub struct BoundRecord<'a> {
    pub record: &'a mut dyn AnyRecord,
    pub collection: String,
}

/// A result sequence that passed validation, together with its collection.
pub struct BoundResults<'a> {
    pub results: &'a mut dyn AnyResultSet,
    pub collection: String,
}

/// Validates the shape of a record argument and resolves its collection.
///
/// # Errors
///
/// - [`DataAccessError::NotAPointer`] for records passed by value
/// - [`DataAccessError::DoublePointer`] for borrowed boxes
/// - [`DataAccessError::MissingCollectionName`] when the type resolves to an empty name
pub fn validate_record(arg: RecordArg<'_>) -> DataResult<BoundRecord<'_>> {
    let record = match arg {
        RecordArg::Borrowed(record) => record,
        RecordArg::Owned(_) => return Err(DataAccessError::NotAPointer),
        RecordArg::Boxed(_) => return Err(DataAccessError::DoublePointer),
    };

    let collection = require_name(record.record_collection(), record.record_type_name())?;

    Ok(BoundRecord { record, collection })
}

/// Validates the shape of a result argument and resolves the element collection.
///
/// # Errors
///
/// - [`DataAccessError::NotASliceAddress`] unless the argument borrows a sequence
/// - [`DataAccessError::MissingCollectionName`] when the element type resolves to an empty name
pub fn validate_results(arg: ResultArg<'_>) -> DataResult<BoundResults<'_>> {
    let results = match arg {
        ResultArg::Borrowed(results) => results,
        ResultArg::Record(_) | ResultArg::Owned(_) => return Err(DataAccessError::NotASliceAddress),
    };

    let collection = require_name(results.element_collection(), results.element_type_name())?;

    Ok(BoundResults { results, collection })
}

/// Resolves the collection name of a record type.
pub fn collection_name_of<R: Record>() -> DataResult<String> {
    require_name(R::collection_name(), std::any::type_name::<R>())
}

fn require_name(name: Cow<'static, str>, type_name: &str) -> DataResult<String> {
    if name.trim().is_empty() {
        return Err(DataAccessError::MissingCollectionName(type_name.to_string()));
    }

    Ok(name.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct ClubMsg {
        text: String,
    }

    impl Record for ClubMsg {}

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Nameless {
        value: i32,
    }

    impl Record for Nameless {
        fn collection_name() -> Cow<'static, str> {
            "".into()
        }
    }

    #[test]
    fn borrowed_record_binds_to_derived_collection() {
        let mut msg = ClubMsg::default();
        let bound = validate_record(RecordArg::from(&mut msg)).unwrap();

        assert_eq!(bound.collection, "club_msg");
    }

    #[test]
    fn owned_record_is_not_a_pointer() {
        let owned: Box<dyn AnyRecord> = Box::new(ClubMsg::default());

        assert!(matches!(
            validate_record(RecordArg::from(owned)),
            Err(DataAccessError::NotAPointer)
        ));
    }

    #[test]
    fn borrowed_box_is_a_double_pointer() {
        let mut boxed: Box<dyn AnyRecord> = Box::new(ClubMsg::default());

        assert!(matches!(
            validate_record(RecordArg::from(&mut boxed)),
            Err(DataAccessError::DoublePointer)
        ));
    }

    #[test]
    fn empty_collection_name_is_missing() {
        let mut nameless = Nameless::default();

        assert!(matches!(
            validate_record(RecordArg::from(&mut nameless)),
            Err(DataAccessError::MissingCollectionName(_))
        ));
        assert!(collection_name_of::<Nameless>().is_err());
    }

    #[test]
    fn result_sequences_bind_to_element_collection() {
        let mut results: Vec<ClubMsg> = vec![];
        let bound = validate_results(ResultArg::from(&mut results)).unwrap();

        assert_eq!(bound.collection, "club_msg");
    }

    #[test]
    fn single_record_is_not_a_slice_address() {
        let mut msg = ClubMsg::default();

        assert!(matches!(
            validate_results(ResultArg::Record(&mut msg)),
            Err(DataAccessError::NotASliceAddress)
        ));
        assert!(matches!(
            validate_results(ResultArg::Owned(Box::new(Vec::<ClubMsg>::new()))),
            Err(DataAccessError::NotASliceAddress)
        ));
    }

    #[test]
    fn result_sequence_of_nameless_records_is_rejected() {
        let mut results: Vec<Nameless> = vec![];

        assert!(matches!(
            validate_results(ResultArg::from(&mut results)),
            Err(DataAccessError::MissingCollectionName(_))
        ));
    }
}
