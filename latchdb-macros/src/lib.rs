//! Procedural macros for the latchdb project.
//!
//! `#[derive(Record)]` implements `latchdb::record::Record` at compile time:
//!
//! ```ignore
//! #[derive(Serialize, Deserialize, Record)]
//! #[record(collection = "car", created = "created", updated = "updated")]
//! pub struct Car {
//!     pub car_id: i64,
//!     pub created: Option<DateTime<Utc>>,
//!     pub updated: Option<DateTime<Utc>>,
//! }
//! ```
//!
//! Without `collection`, the name is the snake-cased type name (`ClubMsg` → `club_msg`).
//! `created` and `updated` name fields of any type that implements
//! `From<chrono::DateTime<Utc>>`, such as `DateTime<Utc>`, `Option<DateTime<Utc>>`
//! or `bson::DateTime`.

#[allow(unused_extern_crates)]
extern crate self as latchdb_macros;

mod derive_record;

fn expand<F: FnOnce(proc_macro2::TokenStream) -> syn::Result<proc_macro2::TokenStream>>(
    fun: F,
    input: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    fun(input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[proc_macro_derive(Record, attributes(record))]
pub fn record(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    expand(derive_record::derive_record, input)
}
