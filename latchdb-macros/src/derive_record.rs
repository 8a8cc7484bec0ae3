use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Fields, Ident, LitStr, Path, Result, parse2, spanned::Spanned,
};

#[derive(Default)]
struct Attributes {
    collection: Option<LitStr>,
    created: Option<LitStr>,
    updated: Option<LitStr>,
    krate: Option<Path>,
}

impl Attributes {
    fn parse(input: &DeriveInput) -> Result<Self> {
        let mut attributes = Attributes::default();

        for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("record")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("collection") {
                    attributes.collection = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("created") {
                    attributes.created = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("updated") {
                    attributes.updated = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("crate") {
                    let path: LitStr = meta.value()?.parse()?;
                    attributes.krate = Some(path.parse()?);
                } else {
                    return Err(meta.error(
                        "expected `collection`, `created`, `updated` or `crate`",
                    ));
                }

                Ok(())
            })?;
        }

        Ok(attributes)
    }
}

pub fn derive_record(item: TokenStream) -> Result<TokenStream> {
    let input = parse2::<DeriveInput>(item)?;
    let attributes = Attributes::parse(&input)?;

    let field_names = named_fields(&input)?;
    let created = attributes
        .created
        .as_ref()
        .map(|name| timestamp_field(name, &field_names))
        .transpose()?;
    let updated = attributes
        .updated
        .as_ref()
        .map(|name| timestamp_field(name, &field_names))
        .transpose()?;

    let krate = match attributes.krate {
        Some(path) => quote! { #path },
        None => krate(),
    };

    let collection = attributes
        .collection
        .unwrap_or_else(|| LitStr::new(&snake_case(&input.ident.to_string()), input.ident.span()));

    let set_created = created.map(|field| {
        quote! {
            fn set_created(&mut self, at: #krate::chrono::DateTime<#krate::chrono::Utc>) {
                self.#field = ::std::convert::From::from(at);
            }
        }
    });
    let set_updated = updated.map(|field| {
        quote! {
            fn set_updated(&mut self, at: #krate::chrono::DateTime<#krate::chrono::Utc>) {
                self.#field = ::std::convert::From::from(at);
            }
        }
    });

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::record::Record for #ident #ty_generics #where_clause {
            fn collection_name() -> ::std::borrow::Cow<'static, str> {
                ::std::borrow::Cow::Borrowed(#collection)
            }

            #set_created

            #set_updated
        }
    })
}

fn named_fields(input: &DeriveInput) -> Result<Vec<Ident>> {
    let Data::Struct(data) = &input.data else {
        return Err(Error::new(input.span(), "Record can only be derived for structs"));
    };

    Ok(match &data.fields {
        Fields::Named(fields) => fields
            .named
            .iter()
            .filter_map(|field| field.ident.clone())
            .collect(),
        _ => vec![],
    })
}

fn timestamp_field(name: &LitStr, fields: &[Ident]) -> Result<Ident> {
    let value = name.value();

    fields
        .iter()
        .find(|field| *field == value.as_str())
        .cloned()
        .ok_or_else(|| Error::new_spanned(name, format!("no field named `{value}`")))
}

/// Same rule as `latchdb::record::snake_case`, applied at compile time.
fn snake_case(name: &str) -> String {
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

fn krate() -> TokenStream {
    if let Ok(found) = crate_name("latchdb") {
        return match found {
            FoundCrate::Itself => quote! { ::latchdb },
            FoundCrate::Name(name) => {
                let ident = Ident::new(&name, Span::call_site());
                quote! { ::#ident }
            }
        };
    }

    match crate_name("latchdb-core") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote! { ::#ident }
        }
        _ => quote! { ::latchdb_core },
    }
}
