//! Wire-level frame types and the streaming codec.
//!
//! The router never touches raw bytes; the built-in adapter encodes
//! [`frame::Frame`] values through [`codec::FrameCodec`] and hands decoded
//! frames back up.

pub mod codec;
pub mod frame;
