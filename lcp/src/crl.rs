use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use std::time::Duration;

use x509_parser::revocation_list::CertificateRevocationList;

use lcp_core::{Clock, Instant};

use crate::error::CrlError;

/**
    External collaborator: fetches the raw DER bytes of a CRL from its
    distribution-point URL. Implemented by the host; network I/O lives
    outside this crate entirely.
*/
#[async_trait::async_trait]
pub trait CrlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CrlError>;
}

/// A single cached CRL, parsed down to what a revocation lookup needs.
#[derive(Debug, Clone)]
struct CachedCrl {
    revoked_serials: BTreeSet<String>,
    this_update: Instant,
    next_update: Instant,
    fetched_at: Instant,
}

impl CachedCrl {
    fn parse(der: &[u8], now: Instant) -> Result<Self, CrlError> {
        let (_, crl) = CertificateRevocationList::from_der(der)
            .map_err(|e| CrlError::Malformed(e.to_string()))?;

        let this_update = crl.tbs_cert_list.this_update.to_datetime();
        let next_update = crl
            .tbs_cert_list
            .next_update
            .ok_or_else(|| CrlError::Malformed("CRL missing nextUpdate".into()))?
            .to_datetime();

        let revoked_serials = crl
            .iter_revoked_certificates()
            .map(|r| r.raw_serial_as_string())
            .collect();

        Ok(CachedCrl {
            revoked_serials,
            this_update,
            next_update,
            fetched_at: now,
        })
    }

    /// Still inside its signed validity window *and* inside the cache TTL.
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        if now < self.this_update || now > self.next_update {
            return false;
        }
        match time::Duration::try_from(ttl) {
            Ok(ttl) => now - self.fetched_at <= ttl,
            Err(_) => true,
        }
    }

    fn contains(&self, serial: &str) -> bool {
        self.revoked_serials.contains(serial)
    }
}

/**
    Shared, per-issuer CRL cache. One instance is owned by the service
    facade and handed to every open license; reads take the `RwLock` shared,
    writes (on refresh) take it exclusively — writes are rare relative to
    lookups, so this stays a many-readers-single-writer access pattern.
*/
pub struct CrlCache<F: CrlFetcher> {
    fetcher: F,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedCrl>>,
}

impl<F: CrlFetcher> CrlCache<F> {
    pub fn new(fetcher: F, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `Ok(true)` if `serial` is revoked according to the CRL at
    /// `url`, refreshing it first if stale. Fetch failures outside the
    /// freshness window fail closed.
    pub async fn is_revoked(
        &self,
        url: &str,
        serial: &str,
        clock: &dyn Clock,
    ) -> Result<bool, CrlError> {
        let now = clock.now();

        if let Some(fresh) = self.fresh_cached(url, now) {
            tracing::debug!(url, "CRL cache hit, no fetch needed");
            return Ok(fresh.contains(serial));
        }

        match self.refresh(url, now).await {
            Ok(crl) => Ok(crl.contains(serial)),
            Err(e) => {
                // A stale-but-not-yet-expired entry from a previous fetch
                // may still exist even though `fresh_cached` rejected it on
                // TTL grounds alone (its signed window is fine); only an
                // absent or expired-by-signed-window entry is fail-closed.
                if let Some(stale) = self.read_within_signed_window(url, now) {
                    tracing::warn!(url, error = %e, "CRL refresh failed, using stale-but-in-window cache");
                    return Ok(stale.contains(serial));
                }
                tracing::error!(url, error = %e, "CRL fetch failed outside freshness window");
                Err(e)
            }
        }
    }

    fn fresh_cached(&self, url: &str, now: Instant) -> Option<CachedCrl> {
        let guard = self.entries.read().unwrap();
        guard
            .get(url)
            .filter(|c| c.is_fresh(now, self.ttl))
            .cloned()
    }

    fn read_within_signed_window(&self, url: &str, now: Instant) -> Option<CachedCrl> {
        let guard = self.entries.read().unwrap();
        guard
            .get(url)
            .filter(|c| now >= c.this_update && now <= c.next_update)
            .cloned()
    }

    async fn refresh(&self, url: &str, now: Instant) -> Result<CachedCrl, CrlError> {
        let der = tokio::time::timeout(Duration::from_secs(10), self.fetcher.fetch(url))
            .await
            .map_err(|_| CrlError::Timeout(Duration::from_secs(10)))??;
        let parsed = CachedCrl::parse(&der, now)?;
        self.entries
            .write()
            .unwrap()
            .insert(url.to_string(), parsed.clone());
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcp_core::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        calls: AtomicUsize,
        der: Vec<u8>,
    }

    #[async_trait::async_trait]
    impl CrlFetcher for CountingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, CrlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.der.clone())
        }
    }

    #[async_trait::async_trait]
    impl CrlFetcher for () {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, CrlError> {
            Err(CrlError::FetchFailed("no network in test".into()))
        }
    }

    #[tokio::test]
    async fn fetch_failure_fails_closed_when_nothing_cached() {
        let cache = CrlCache::new((), Duration::from_secs(600));
        let err = cache
            .is_revoked("https://example.com/crl", "01", &SystemClock)
            .await
            .unwrap_err();
        assert!(matches!(err, CrlError::FetchFailed(_)));
    }

    const REVOKED_CRL_DER: &[u8] = include_bytes!("../tests/fixtures/revoked.crl.der");
    // `raw_serial_as_string()` renders colon-separated lowercase hex, not
    // plain hex (see `CachedCrl::parse`'s use of it above).
    const REVOKED_SERIAL: &str = "0a:c5:b1:6c:b1:0b:ed:63:95:44:b8:40:e4:21:20:cb:94:34:e3:20";
    const OTHER_SERIAL: &str = "0a:c5:b1:6c:b1:0b:ed:63:95:44:b8:40:e4:21:20:cb:94:34:e3:1f";

    #[tokio::test]
    async fn revoked_serial_is_flagged_and_others_are_not() {
        // spec §8 scenario 5.
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
            der: REVOKED_CRL_DER.to_vec(),
        };
        let cache = CrlCache::new(fetcher, Duration::from_secs(600));

        let revoked = cache
            .is_revoked("https://example.com/crl", REVOKED_SERIAL, &SystemClock)
            .await
            .unwrap();
        assert!(revoked);

        let clean = cache
            .is_revoked("https://example.com/crl", OTHER_SERIAL, &SystemClock)
            .await
            .unwrap();
        assert!(!clean);
    }

    #[tokio::test]
    async fn fresh_cache_entry_avoids_a_second_fetch() {
        let fetcher = CountingFetcher {
            calls: AtomicUsize::new(0),
            der: REVOKED_CRL_DER.to_vec(),
        };
        let cache = CrlCache::new(fetcher, Duration::from_secs(600));

        cache
            .is_revoked("https://example.com/crl", OTHER_SERIAL, &SystemClock)
            .await
            .unwrap();
        cache
            .is_revoked("https://example.com/crl", OTHER_SERIAL, &SystemClock)
            .await
            .unwrap();

        assert_eq!(cache.fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
