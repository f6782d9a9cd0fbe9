//! Inference helpers on top of a trained [`Network`](crate::network::Network).

mod classify;
mod decoder;

pub use classify::{classify, Classification};
pub use decoder::Decoder;
