use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

pub fn derive_broadcast(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    // Absolute path; `relay_engine` aliases itself in lib.rs so this also resolves in-crate.
    TokenStream::from(quote! {
        impl #impl_generics ::relay_engine::bus::Broadcast for #name #ty_generics #where_clause {
        }
    })
}
