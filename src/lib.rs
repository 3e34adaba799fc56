//! Styled QR code rendering served over HTTP.
//!
//! A request flows through [`pipeline::generate`]: the base symbol is
//! rendered by [`qr`], optionally repainted with a [`gradient`], optionally
//! topped with a [`logo`], and encoded as PNG.

pub mod args;
pub mod color;
pub mod error;
pub mod gradient;
pub mod logo;
pub mod pipeline;
pub mod qr;
pub mod server;

pub use error::{QrError, QrResult};
