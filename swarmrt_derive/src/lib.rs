use proc_macro::TokenStream;

extern crate proc_macro;
extern crate quote;
extern crate syn;

#[macro_use]
extern crate proc_macro_error;

mod object;

/// Derives `swarmrt::interface::TypeIdentified` for a type, giving it a
/// deterministic 128-bit [`TypeId`](../swarmrt/interface/struct.TypeId.html)
/// so it can participate in `query_interface`.
#[proc_macro_error]
#[proc_macro_derive(Object)]
pub fn derive_object(input: TokenStream) -> TokenStream {
    object::derive_object(input)
}
