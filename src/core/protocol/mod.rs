// src/core/protocol/mod.rs

pub mod line_codec;
pub mod response;

pub use line_codec::LineCodec;
pub use response::Response;
