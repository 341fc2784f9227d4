//! Canonical wire model for the neuron gateway (§4.A): vendor-neutral
//! request/response/event shapes, the SSE codec ([`sse`]), the tool-schema
//! validator ([`validate`]), and the provider traits every `neuron-provider-*`
//! crate implements against.

pub mod error;
pub mod events;
pub mod sse;
pub mod stream;
pub mod traits;
pub mod types;
pub mod validate;
pub mod wasm;

pub use error::*;
pub use events::*;
pub use sse::*;
pub use stream::*;
pub use traits::*;
pub use types::*;
pub use validate::*;
pub use wasm::*;
