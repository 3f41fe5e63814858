//! Derive macro for `keel_orm::Entity`.
//!
//! Generates the model metadata (table name, ordered field descriptors)
//! and the value accessors the executor uses to read arguments out of an
//! entity and to write scanned columns back in. Column names default to
//! the snake_case of the field name; `#[orm(column = "...")]` overrides a
//! field and `#[orm(table = "...")]` overrides the table.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

#[proc_macro_derive(Entity, attributes(orm))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic types",
        ));
    }

    let mut table = snake_case(&ident.to_string());
    for attr in &input.attrs {
        if attr.path().is_ident("orm") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    let lit: LitStr = meta.value()?.parse()?;
                    table = lit.value();
                    Ok(())
                } else {
                    Err(meta.error("expected `table = \"...\"`"))
                }
            })?;
        }
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Entity requires named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                ident,
                "Entity can only be derived for structs",
            ))
        }
    };

    let mut descriptors = Vec::new();
    let mut value_arms = Vec::new();
    let mut apply_arms = Vec::new();
    for field in fields {
        let field_ident = field.ident.as_ref().expect("named field");
        let name = field_ident.to_string();
        let mut column = snake_case(&name);
        for attr in &field.attrs {
            if attr.path().is_ident("orm") {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("column") {
                        let lit: LitStr = meta.value()?.parse()?;
                        column = lit.value();
                        Ok(())
                    } else {
                        Err(meta.error("expected `column = \"...\"`"))
                    }
                })?;
            }
        }
        descriptors.push(quote! {
            ::keel_orm::FieldDescriptor { name: #name, column: #column }
        });
        value_arms.push(quote! {
            #name => ::std::option::Option::Some(::keel_orm::Value::from(self.#field_ident.clone())),
        });
        apply_arms.push(quote! {
            #name => {
                self.#field_ident = ::keel_orm::FromValue::from_value(value)?;
                ::std::result::Result::Ok(())
            }
        });
    }

    Ok(quote! {
        impl ::keel_orm::Entity for #ident {
            fn table_name() -> &'static str {
                #table
            }

            fn fields() -> &'static [::keel_orm::FieldDescriptor] {
                &[ #( #descriptors ),* ]
            }

            fn value(&self, field: &str) -> ::std::option::Option<::keel_orm::Value> {
                match field {
                    #( #value_arms )*
                    _ => ::std::option::Option::None,
                }
            }

            fn apply(
                &mut self,
                field: &str,
                value: ::keel_orm::Value,
            ) -> ::std::result::Result<(), ::keel_orm::OrmError> {
                match field {
                    #( #apply_arms )*
                    _ => ::std::result::Result::Err(
                        ::keel_orm::OrmError::UnknownField(field.to_string()),
                    ),
                }
            }
        }
    })
}

/// Camel case to snake_case, keeping acronym runs together: `ID` becomes
/// `id`, `FirstName` becomes `first_name`, `HTTPCode` becomes `http_code`.
fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 2);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower_or_digit =
                i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let prev_upper = i > 0 && chars[i - 1].is_ascii_uppercase();
            let next_lower = i + 1 < chars.len() && chars[i + 1].is_ascii_lowercase();
            if prev_lower_or_digit || (prev_upper && next_lower) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
