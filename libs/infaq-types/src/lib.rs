//! Shared primitives for the infaq payment core.
//!
//! This crate provides:
//! - Irreversible secret masking for administrative read paths (`mask_secret`)
//! - Detection of masked placeholders echoed back by admin forms (`is_masked_placeholder`)
//! - The timestamped HMAC-SHA256 webhook signature scheme (`sign_payload`, `verify_signature`)

mod errors;
mod masking;
mod signature;

pub use errors::SignatureError;
pub use masking::{REDACTION_MARKER, is_masked_placeholder, mask_secret};
pub use signature::{compute_signature, constant_time_compare, sign_payload, verify_signature};
