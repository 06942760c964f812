//! Byte codecs.
//!
//! Currently only [`base64`] with the standard alphabet and `=` padding.

pub mod base64;
