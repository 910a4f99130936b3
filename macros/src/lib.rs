use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Runs the annotated function as the root task of `handoff::runtime::start`.
///
/// The function returns once every task it spawned has finished.
/// A panic in the root task is resumed on the calling thread.
#[proc_macro_attribute]
pub fn start(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = parse_macro_input!(item as ItemFn);

    let attributes = &item.attrs;
    let visibility = &item.vis;
    let signature = &item.sig;
    let body = &item.block;

    let result = quote! {
        #(#attributes)*
        #visibility #signature {
            match ::handoff::runtime::start(move || #body) {
                Ok(output) => output,
                Err(payload) => ::std::panic::resume_unwind(payload),
            }
        }
    };

    result.into()
}
