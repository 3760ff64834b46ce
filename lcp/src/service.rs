use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lcp_core::Clock;

use crate::crl::{CrlCache, CrlFetcher};
use crate::decrypt::{ArchiveResource, DecryptionStream};
use crate::error::{KeyError, LcpError, LicenseError};
use crate::key::{ContentKey, KeyProvider};
use crate::license::License;
use crate::profile::ProfileRegistry;
use crate::rights::RightsStorage;

/// Opaque handle to a license opened by the facade. Closing it (via
/// [`LcpService::close`]) releases the underlying [`OpenLicense`]
/// atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LicenseHandle(u64);

struct OpenLicense {
    license: License,
    content_key: Option<ContentKey>,
}

/**
    Orchestrates open-license -> unlock -> decrypt. Owns a single profile
    registry, the CRL cache, and all open license handles; each handle's
    state is guarded by its own `Mutex` so concurrent calls against
    *different* handles never contend. Locks are always acquired in
    facade -> handle -> CRL cache order, never recursively.
*/
pub struct LcpService<F: CrlFetcher> {
    profiles: ProfileRegistry,
    crl_cache: Arc<CrlCache<F>>,
    clock: Arc<dyn Clock>,
    handles: Mutex<HashMap<LicenseHandle, Arc<Mutex<OpenLicense>>>>,
    next_handle: AtomicU64,
}

impl<F: CrlFetcher> LcpService<F> {
    pub fn new(profiles: ProfileRegistry, crl_fetcher: F, crl_ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            profiles,
            crl_cache: Arc::new(CrlCache::new(crl_fetcher, crl_ttl)),
            clock,
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Parses and verifies `json`, checks the license's time window, and
    /// returns an opaque handle on success. The content key is not present
    /// yet — call [`LcpService::add_passphrase`] to unlock it.
    pub async fn open_license(&self, json: &str) -> Result<LicenseHandle, LcpError> {
        let license = License::parse(json).map_err(LcpError::License)?;
        license
            .verify(&self.profiles, &self.crl_cache, self.clock.as_ref())
            .await
            .map_err(LcpError::License)?;

        if !license.is_within_time_window(self.clock.now()) {
            return Err(LcpError::License(LicenseError::OutOfDate));
        }

        let handle = LicenseHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let open = OpenLicense {
            license,
            content_key: None,
        };
        self.handles
            .lock()
            .unwrap()
            .insert(handle, Arc::new(Mutex::new(open)));

        tracing::info!(handle = handle.0, "license opened");
        Ok(handle)
    }

    /// Derives the user key from `passphrase`, confirms it against the
    /// license's key-check, and only then unwraps the content key —
    /// `check_user_key` is mandatory before `unwrap_content_key`. A failed
    /// check leaves no content-key material reachable from this handle.
    pub fn add_passphrase(&self, handle: LicenseHandle, passphrase: &str) -> Result<(), LcpError> {
        let entry = self.handle_entry(handle)?;
        let mut open = entry.lock().unwrap();

        let profile = self
            .profiles
            .get(&open.license.encryption.profile)
            .map_err(LcpError::License)?;
        let uk = KeyProvider::derive_user_key(profile, passphrase);

        if !KeyProvider::check_user_key(&open.license, &uk).map_err(LcpError::Key)? {
            return Err(LcpError::Key(KeyError::UserKeyCheckFailed));
        }

        let cek = KeyProvider::unwrap_content_key(&open.license, &uk).map_err(LcpError::Key)?;
        open.content_key = Some(cek);
        tracing::debug!(handle = handle.0, "content key unwrapped");
        Ok(())
    }

    /// Wraps `resource` in a [`DecryptionStream`] using the handle's
    /// content key, established at creation time. Re-keying an open handle
    /// is not supported; a new key requires a new handle.
    pub fn decrypt_stream<R: ArchiveResource>(
        &self,
        handle: LicenseHandle,
        resource: R,
        ciphertext_len: u64,
    ) -> Result<DecryptionStream<R>, LcpError> {
        let entry = self.handle_entry(handle)?;
        let open = entry.lock().unwrap();
        let cek = open.content_key.as_ref().ok_or(LcpError::ContextInvalid)?;
        Ok(DecryptionStream::new(resource, cek, ciphertext_len))
    }

    /// Consume a countable right against this handle's license, persisting
    /// through `storage`.
    pub fn consume_right<S: RightsStorage>(
        &self,
        handle: LicenseHandle,
        storage: &S,
        right: &str,
        delta: u64,
    ) -> Result<u64, LcpError> {
        let entry = self.handle_entry(handle)?;
        let open = entry.lock().unwrap();
        let manager = crate::rights::RightsManager::new(&open.license, storage);
        manager.consume(right, delta).map_err(LcpError::Rights)
    }

    /// Releases the handle, zeroizing its content key in place before it is
    /// dropped.
    pub fn close(&self, handle: LicenseHandle) -> Result<(), LcpError> {
        let entry = self
            .handles
            .lock()
            .unwrap()
            .remove(&handle)
            .ok_or(LcpError::ContextInvalid)?;
        let mut open = entry.lock().unwrap();
        open.content_key = None; // ContentKey's Drop zeroizes its bytes.
        tracing::info!(handle = handle.0, "license closed");
        Ok(())
    }

    fn handle_entry(&self, handle: LicenseHandle) -> Result<Arc<Mutex<OpenLicense>>, LcpError> {
        self.handles
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .ok_or(LcpError::ContextInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crl::CrlFetcher;
    use crate::error::CrlError;
    use crate::profile::ProfileRegistry;
    use crate::rights::InMemoryRightsStorage;
    use lcp_core::SystemClock;

    const SAMPLE: &str = include_str!("../tests/fixtures/license.json");

    struct NoCrlFetcher;
    #[async_trait::async_trait]
    impl CrlFetcher for NoCrlFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, CrlError> {
            Err(CrlError::FetchFailed("no network in test".into()))
        }
    }

    fn service() -> LcpService<NoCrlFetcher> {
        let profiles = ProfileRegistry::with_default().unwrap();
        LcpService::new(
            profiles,
            NoCrlFetcher,
            std::time::Duration::from_secs(600),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn open_add_passphrase_and_consume_right() {
        let service = service();
        let handle = service.open_license(SAMPLE).await.unwrap();
        service.add_passphrase(handle, "White whales are huge!").unwrap();

        let storage = InMemoryRightsStorage::default();
        let left = service.consume_right(handle, &storage, "copy", 4).unwrap();
        assert_eq!(left, 6);

        service.close(handle).unwrap();
        assert!(service.add_passphrase(handle, "White whales are huge!").is_err());
    }

    #[tokio::test]
    async fn wrong_passphrase_is_rejected() {
        let service = service();
        let handle = service.open_license(SAMPLE).await.unwrap();
        let err = service.add_passphrase(handle, "wrong").unwrap_err();
        assert_eq!(err.status_code().code(), 21);
    }
}
