use proc_macro::TokenStream;
use quote::quote;
use syn::*;

pub fn derive_object(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // `TypeId::from_qualified_name` is evaluated at the derive target's own
    // compile time, fed its own `module_path!()`, so the hash is seeded
    // from the type's fully-qualified path rather than just its bare
    // local identifier (two same-named types in different modules would
    // otherwise collide, which is the one thing a derive macro running at
    // expansion time can't see for itself — it only has the local ident).
    let expanded = quote! {
        #[automatically_derived]
        impl #impl_generics swarmrt::interface::TypeIdentified for #name #ty_generics #where_clause {
            const TYPE_ID: swarmrt::interface::TypeId =
                swarmrt::interface::TypeId::from_qualified_name(
                    concat!(module_path!(), "::", stringify!(#name))
                );
        }
    };

    TokenStream::from(expanded)
}
