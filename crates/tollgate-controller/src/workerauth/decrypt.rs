//! Credential decryption.

use std::sync::Arc;

use tokio::time::{timeout_at, Instant};
use tollgate_core::{NoncePurpose, WorkerAuthInfo};
use tollgate_kms::Wrapper;
use tollgate_proto::EncryptedBlob;

use super::WorkerAuthError;

/// Opens an assembled credential into validated claims.
#[derive(Clone)]
pub struct CredentialDecryptor {
    wrapper: Arc<dyn Wrapper>,
}

impl CredentialDecryptor {
    pub fn new(wrapper: Arc<dyn Wrapper>) -> Self {
        Self { wrapper }
    }

    /// Decode, decrypt and validate `encoded`.
    ///
    /// Every failure, including the wrapper missing `deadline`, is reported
    /// as `DecryptionFailed` and no partial claims are returned.
    pub async fn decrypt(
        &self,
        encoded: &str,
        deadline: Instant,
    ) -> Result<WorkerAuthInfo, WorkerAuthError> {
        let blob = EncryptedBlob::from_base64(encoded).map_err(|e| {
            WorkerAuthError::DecryptionFailed(format!("error decoding credential: {e}"))
        })?;

        let plaintext = timeout_at(deadline, self.wrapper.decrypt(&blob, None))
            .await
            .map_err(|_| WorkerAuthError::DecryptionFailed("decryption deadline exceeded".into()))?
            .map_err(|e| WorkerAuthError::DecryptionFailed(e.to_string()))?;

        let info = WorkerAuthInfo::from_json(&plaintext)
            .map_err(|e| WorkerAuthError::DecryptionFailed(format!("error decoding claims: {e}")))?;
        info.validate(NoncePurpose::WorkerAuth)
            .map_err(|e| WorkerAuthError::DecryptionFailed(e.to_string()))?;

        Ok(info)
    }
}

impl std::fmt::Debug for CredentialDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDecryptor")
            .field("key_id", &self.wrapper.key_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tollgate_core::ConnectionNonce;
    use tollgate_kms::{generate_key_hex, AeadWrapper};

    use super::*;

    fn wrapper() -> Arc<AeadWrapper> {
        Arc::new(AeadWrapper::from_hex("worker-auth", &generate_key_hex()).unwrap())
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    async fn seal(wrapper: &AeadWrapper, info: &WorkerAuthInfo) -> String {
        let json = info.to_json().unwrap();
        wrapper.encrypt(&json, None).await.unwrap().to_base64()
    }

    fn claims() -> WorkerAuthInfo {
        WorkerAuthInfo::new(ConnectionNonce::new("n1"), b"cert".to_vec(), b"key".to_vec())
    }

    #[tokio::test]
    async fn test_decrypts_sealed_claims() {
        let w = wrapper();
        let encoded = seal(&w, &claims()).await;

        let decryptor = CredentialDecryptor::new(w);
        let info = decryptor.decrypt(&encoded, deadline()).await.unwrap();
        assert_eq!(info, claims());
    }

    #[tokio::test]
    async fn test_wrong_key_is_decryption_failure() {
        let encoded = seal(&wrapper(), &claims()).await;

        let decryptor = CredentialDecryptor::new(wrapper());
        assert!(matches!(
            decryptor.decrypt(&encoded, deadline()).await,
            Err(WorkerAuthError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_base64_is_decryption_failure() {
        let decryptor = CredentialDecryptor::new(wrapper());
        assert!(matches!(
            decryptor.decrypt("not*base64", deadline()).await,
            Err(WorkerAuthError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_nonce_is_rejected() {
        let w = wrapper();
        let mut info = claims();
        info.connection_nonce = ConnectionNonce::new("");
        let encoded = seal(&w, &info).await;

        let decryptor = CredentialDecryptor::new(w);
        assert!(matches!(
            decryptor.decrypt(&encoded, deadline()).await,
            Err(WorkerAuthError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_non_json_plaintext_is_rejected() {
        let w = wrapper();
        let encoded = w.encrypt(b"plain text", None).await.unwrap().to_base64();

        let decryptor = CredentialDecryptor::new(w);
        assert!(matches!(
            decryptor.decrypt(&encoded, deadline()).await,
            Err(WorkerAuthError::DecryptionFailed(_))
        ));
    }
}
