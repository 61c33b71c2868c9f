mod broadcast;
mod event;

use proc_macro::TokenStream;

/// Implements `relay_engine::bus::Event` for a struct or enum.
///
/// The result type delivered through the sender's future is declared with
/// `#[event(output = T)]` and defaults to `()`.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(item: TokenStream) -> TokenStream {
    event::derive_event(item)
}

/// Implements `relay_engine::bus::Broadcast` for a struct or enum.
#[proc_macro_derive(Broadcast)]
pub fn derive_broadcast(item: TokenStream) -> TokenStream {
    broadcast::derive_broadcast(item)
}
