//! Derive macro for automatic binary serialization.
//!
//! Generates `Encode` and `Decode` implementations for named-field structs.
//! Fields are written in declaration order; each field delegates to its own
//! `Encode`/`Decode` impl, so the struct layout alone determines the wire
//! format. The traits live in `stackvm::encoding`.
//!
//! ```ignore
//! use stackvm_derive::BinaryCodec;
//!
//! #[derive(BinaryCodec)]
//! pub struct Instruction {
//!     pub opcode: u8,
//!     pub operand: i32,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return syn::Error::new_spanned(
                    &input,
                    "BinaryCodec derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(
                &input,
                "BinaryCodec derive requires a struct with named fields",
            )
            .to_compile_error()
            .into();
        }
    };

    let names: Vec<_> = fields
        .iter()
        .map(|field| field.ident.clone().expect("named field"))
        .collect();
    let types: Vec<_> = fields.iter().map(|field| field.ty.clone()).collect();

    let expanded = quote! {
        impl #impl_generics crate::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::encoding::EncodeSink>(&self, out: &mut S) {
                #( self.#names.encode(out); )*
            }
        }

        impl #impl_generics crate::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> Result<Self, crate::encoding::DecodeError> {
                Ok(Self {
                    #( #names: <#types as crate::encoding::Decode>::decode(input)?, )*
                })
            }
        }
    };

    expanded.into()
}
