//! Readers for the `logprobs` section of chat completion responses.
//!
//! [`ChatCompletion`] parses a whole response in memory, while [`ArrayStream`]
//! walks the token array of an arbitrarily large response one entry at a time.

pub mod array_stream;
pub mod document;
mod error;
pub mod logging;
pub mod render;

pub use array_stream::{ArrayStream, DEFAULT_CHUNK_SIZE};
pub use document::{ChatCompletion, TokenLogprob, TopLogprob, load};
pub use error::StreamError;
