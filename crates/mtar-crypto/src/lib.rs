//! Content digests for multi-target application archives
//!
//! This crate provides the hashing primitives used to detect whether the bytes
//! of a module changed since a previous deployment.
//!
//! # Components
//!
//! - **DigestAccumulator**: incremental hashing over arbitrarily chunked input
//! - **DigestAlgorithm**: configurable algorithm selection (MD5, SHA-256)
//!
//! # Examples
//!
//! ```
//! use mtar_crypto::{DigestAccumulator, DigestAlgorithm};
//!
//! let mut accumulator = DigestAccumulator::new(DigestAlgorithm::Md5);
//! accumulator.update(b"Hello, ");
//! accumulator.update(b"World!");
//! assert_eq!(accumulator.finalize(), "65A8E27D8879283831B664BD8B7F0AD4");
//! ```

#![warn(missing_docs)]

pub mod accumulator;
pub mod error;

pub use accumulator::{DigestAccumulator, DigestAlgorithm, digest_hex};
pub use error::CryptoError;
