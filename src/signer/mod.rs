//! The signing party's side of the protocol, as seen from this crate.

pub mod client;
pub mod software;
pub mod wire;

pub use client::{RemoteSigner, SignedChallenge, SignerTransport};
pub use software::SoftwareSigner;
