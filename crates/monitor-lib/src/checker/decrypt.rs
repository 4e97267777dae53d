//! Access settings decryption

use crate::error::DecryptError;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Decrypts a single ciphertext string
#[async_trait]
pub trait Decryptor: Send + Sync {
    async fn decrypt(&self, value: &str) -> Result<String, DecryptError>;
}

type DecryptFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, DecryptError>> + Send + 'a>>;

/// Decrypt every string leaf of an access settings tree
///
/// Objects and arrays are walked recursively; numbers, booleans and nulls pass through.
pub fn decrypt_access<'a>(decryptor: &'a dyn Decryptor, value: &'a Value) -> DecryptFuture<'a> {
    Box::pin(async move {
        match value {
            Value::String(s) => Ok(Value::String(decryptor.decrypt(s).await?)),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(decrypt_access(decryptor, item).await?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key.clone(), decrypt_access(decryptor, item).await?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    })
}
