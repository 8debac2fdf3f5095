//! Language server exposing packwerk diagnostics to any LSP editor.

pub mod codec;
pub mod protocol;

mod bridge;
mod server;

pub use bridge::{LspNotifier, LspSink, Outbound};
pub use server::{ServeOutcome, ServerOptions, serve, serve_stdio};
