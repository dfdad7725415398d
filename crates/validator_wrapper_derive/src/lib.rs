use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

/// Implements `validator_wrapper::form::FormModel` by matching field names
/// against the struct's named fields. Values go through `ToString`.
///
/// `#[form(name = "...")]` binds a field under another name and
/// `#[form(skip)]` leaves it out.
#[proc_macro_derive(FormModel, attributes(form))]
pub fn derive_form_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormModel derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;
    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormModel derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormModel derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let mut arms = Vec::new();
    for field in &named_fields {
        let binding = match field_binding(field) {
            Ok(Some(binding)) => binding,
            Ok(None) => continue,
            Err(error) => return error.to_compile_error().into(),
        };
        let Some(field_ident) = &field.ident else {
            continue;
        };
        arms.push(quote! {
            #binding => ::core::option::Option::Some(
                ::std::string::ToString::to_string(&self.#field_ident)
            ),
        });
    }

    let path = crate_path();
    quote! {
        impl #path::form::FormModel for #model_ident {
            fn field_value(&self, name: &str) -> ::core::option::Option<::std::string::String> {
                match name {
                    #(#arms)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    }
    .into()
}

/// The name a field is bound under, or `None` when it is skipped.
fn field_binding(field: &Field) -> syn::Result<Option<String>> {
    let mut name = field.ident.as_ref().map(|ident| {
        let raw = ident.to_string();
        raw.strip_prefix("r#").map(str::to_string).unwrap_or(raw)
    });
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                name = None;
                return Ok(());
            }
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(meta.error("form field name must not be empty"));
                }
                name = Some(value.value());
                return Ok(());
            }
            Err(meta.error("expected `name = \"...\"` or `skip`"))
        })?;
    }
    Ok(name)
}

fn crate_path() -> TokenStream2 {
    match crate_name("validator_wrapper") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::validator_wrapper),
    }
}
