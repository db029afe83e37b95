//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations
//! from `#[error("...")]` attributes, so error enums stay declarative:
//!
//! ```ignore
//! use stackvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum VmError {
//!     #[error("stack overflow")]
//!     StackOverflow,
//!     #[error("invalid opcode {opcode}")]
//!     InvalidOpcode { opcode: u8 },
//!     #[error("unresolved label: {0}")]
//!     UnresolvedLabel(String),
//! }
//! ```
//!
//! Messages interpolate `{field}` for named fields and `{0}`, `{1}` for
//! tuple fields. Fields not referenced by the message are ignored, so a
//! variant may carry more context than it displays.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let display_body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(variant_arm)
                .collect::<syn::Result<Vec<_>>>()?;
            quote! { match self { #(#arms)* } }
        }
        Data::Struct(data) => struct_body(input, &data.fields)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds one `match` arm writing the variant's message.
fn variant_arm(variant: &syn::Variant) -> syn::Result<proc_macro2::TokenStream> {
    let ident = &variant.ident;
    let message = error_attribute(&variant.attrs, variant)?;

    Ok(match &variant.fields {
        Fields::Unit => quote! {
            Self::#ident => write!(f, #message),
        },
        Fields::Named(fields) => {
            let names: Vec<_> = fields
                .named
                .iter()
                .map(|field| field.ident.clone().expect("named field"))
                .collect();
            let (format, args) = message_args(&message, &names);
            quote! {
                Self::#ident { #(#names),* } => write!(f, #format #(, #args = #args)*),
            }
        }
        Fields::Unnamed(fields) => {
            let names: Vec<_> = (0..fields.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let renamed = positional_to_named(&message, names.len());
            let (format, args) = message_args(&renamed, &names);
            quote! {
                Self::#ident(#(#names),*) => write!(f, #format #(, #args = #args)*),
            }
        }
    })
}

/// Display body for a struct error (unit or named fields).
fn struct_body(input: &DeriveInput, fields: &Fields) -> syn::Result<proc_macro2::TokenStream> {
    let message = error_attribute(&input.attrs, input)?;
    Ok(match fields {
        Fields::Unit => quote! { write!(f, #message) },
        Fields::Named(fields) => {
            let names: Vec<_> = fields
                .named
                .iter()
                .map(|field| field.ident.clone().expect("named field"))
                .collect();
            let (format, args) = message_args(&message, &names);
            quote! { write!(f, #format #(, #args = self.#args)*) }
        }
        Fields::Unnamed(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive on tuple structs is not supported; use a named struct",
            ));
        }
    })
}

/// Extracts the string literal from `#[error("...")]`.
fn error_attribute<T: quote::ToTokens>(
    attrs: &[syn::Attribute],
    spanned: &T,
) -> syn::Result<String> {
    for attr in attrs {
        if attr.path().is_ident("error") {
            let lit: LitStr = attr.parse_args().map_err(|_| {
                syn::Error::new_spanned(
                    attr,
                    "expected a string literal, e.g. #[error(\"invalid opcode {opcode}\")]",
                )
            })?;
            return Ok(lit.value());
        }
    }
    Err(syn::Error::new_spanned(
        spanned,
        "missing #[error(\"...\")] attribute",
    ))
}

/// Splits a message into the format literal and the subset of fields it
/// actually references, in field order.
fn message_args(message: &str, names: &[syn::Ident]) -> (LitStr, Vec<syn::Ident>) {
    let referenced: Vec<syn::Ident> = names
        .iter()
        .filter(|name| {
            let name = name.to_string();
            message.contains(&format!("{{{name}}}")) || message.contains(&format!("{{{name}:"))
        })
        .cloned()
        .collect();
    let lit = LitStr::new(message, proc_macro2::Span::call_site());
    (lit, referenced)
}

/// Rewrites `{0}` / `{0:spec}` placeholders to `{f0}` / `{f0:spec}`.
fn positional_to_named(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..count).rev() {
        out = out.replace(&format!("{{{i}}}"), &format!("{{f{i}}}"));
        out = out.replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    out
}
