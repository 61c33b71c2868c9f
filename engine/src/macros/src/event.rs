use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{DeriveInput, Type, parse_macro_input};

pub fn derive_event(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let output = match output_type(&ast) {
        Ok(output) => output,
        Err(err) => return err.to_compile_error().into(),
    };

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    TokenStream::from(quote! {
        impl #impl_generics ::relay_engine::bus::Event for #name #ty_generics #where_clause {
            type Output = #output;
        }
    })
}

/// Reads `#[event(output = T)]`, falling back to the unit type.
fn output_type(ast: &DeriveInput) -> syn::Result<TokenStream2> {
    let mut output: Option<Type> = None;
    for attr in ast.attrs.iter().filter(|attr| attr.path().is_ident("event")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("output") {
                if output.is_some() {
                    return Err(meta.error("duplicate `output` in #[event]"));
                }
                output = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported #[event] key, expected `output`"))
            }
        })?;
    }
    Ok(match output {
        Some(ty) => quote!(#ty),
        None => quote!(()),
    })
}
