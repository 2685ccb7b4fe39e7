//! Payment-details decryption seam.
//!
//! Partner gateway endorsements carry an encrypted details blob. This crate
//! never decrypts it itself; it asks an injected service and only reads the
//! `payin` flag from the result.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Decrypts partner gateway payment details.
#[async_trait]
pub trait PaymentDetailsDecryptor: Send + Sync {
    /// Decrypt `encrypted` into an opaque JSON document.
    async fn decrypt(&self, encrypted: &str) -> Result<Value>;
}

/// Whether decrypted details allow pay-ins. A missing or non-boolean flag
/// counts as `false`.
#[must_use]
pub fn supports_payin(details: &Value) -> bool {
    details.get("payin").and_then(Value::as_bool).unwrap_or(false)
}

/// Decryptor that treats the stored blob as plain JSON.
///
/// Unparseable blobs decrypt to an empty object, so payin reads as `false`.
#[cfg(any(test, feature = "test-membership"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPaymentDetails;

#[cfg(any(test, feature = "test-membership"))]
#[async_trait]
impl PaymentDetailsDecryptor for StaticPaymentDetails {
    async fn decrypt(&self, encrypted: &str) -> Result<Value> {
        Ok(serde_json::from_str(encrypted).unwrap_or_else(|_| Value::Object(Default::default())))
    }
}
