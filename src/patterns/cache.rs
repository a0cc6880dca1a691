// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-run pattern memo.
//!
//! Each `(framework, version, platform)` key is resolved at most once per
//! run. Concurrent first requesters share one in-flight resolution through a
//! per-key `OnceCell`, and every waiter receives the same pattern or the
//! same failure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::InstrumentConfig;
use crate::error::PatternError;
use crate::platforms::PlatformDescriptor;
#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::pattern::InstrumentationPattern;
use super::provider::PatternProvider;

type PatternKey = (String, String, String);
type Resolved = Result<Arc<InstrumentationPattern>, PatternError>;

/// Memoising front for a [`PatternProvider`] with descriptor fallback.
pub struct PatternCache {
    provider: Option<Arc<dyn PatternProvider>>,
    entries: Mutex<HashMap<PatternKey, Arc<OnceCell<Resolved>>>>,
    resolutions: AtomicUsize,
}

impl PatternCache {
    /// `provider` may be absent; descriptors' built-in patterns are used then.
    pub fn new(provider: Option<Arc<dyn PatternProvider>>) -> Self {
        Self {
            provider,
            entries: Mutex::new(HashMap::new()),
            resolutions: AtomicUsize::new(0),
        }
    }

    /// Resolve the pattern for a framework on `platform`.
    ///
    /// The provider is asked first. On `NotFound`, on a provider failure, or
    /// with no provider, the descriptor's built-in pattern is used.
    /// `entry_points` only reach the fallback of the first requester.
    pub async fn resolve(
        &self,
        framework: &str,
        version: &str,
        platform: &dyn PlatformDescriptor,
        entry_points: &[PathBuf],
        config: &InstrumentConfig,
    ) -> Resolved {
        let key = (
            framework.to_string(),
            version.to_string(),
            platform.name().to_string(),
        );
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            entries.entry(key).or_default().clone()
        };

        let fresh = AtomicBool::new(false);
        let result = cell
            .get_or_init(|| async {
                fresh.store(true, Ordering::SeqCst);
                self.resolutions.fetch_add(1, Ordering::SeqCst);
                self.resolve_uncached(framework, version, platform, entry_points, config)
                    .await
            })
            .await
            .clone();

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_pattern_lookup(!fresh.load(Ordering::SeqCst));
        #[cfg(not(feature = "telemetry"))]
        let _ = fresh;

        result
    }

    async fn resolve_uncached(
        &self,
        framework: &str,
        version: &str,
        platform: &dyn PlatformDescriptor,
        entry_points: &[PathBuf],
        config: &InstrumentConfig,
    ) -> Resolved {
        if let Some(provider) = &self.provider {
            match provider.lookup(framework, version, platform.name()).await {
                Ok(mut pattern) => {
                    if pattern.id.is_empty() {
                        pattern.id = InstrumentationPattern::default_id(platform.name(), framework);
                    }
                    pattern.validate()?;
                    debug!(
                        framework = %framework,
                        platform = %platform.name(),
                        pattern_id = %pattern.id,
                        "Pattern resolved by provider"
                    );
                    return Ok(Arc::new(pattern));
                }
                Err(e) if e.is_not_found() => {
                    debug!(framework = %framework, platform = %platform.name(), "Provider has no pattern; using built-in");
                }
                Err(e) => {
                    warn!(
                        framework = %framework,
                        platform = %platform.name(),
                        error = %e,
                        "Pattern provider failed; using built-in"
                    );
                }
            }
        }

        let pattern =
            platform.generate_instrumentation(framework, version, entry_points, config)?;
        pattern.validate()?;
        Ok(Arc::new(pattern))
    }

    /// Number of keys resolved fresh (provider or fallback invoked).
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    /// Number of distinct keys requested.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for PatternCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternCache")
            .field("has_provider", &self.provider.is_some())
            .field("keys", &self.len())
            .field("resolutions", &self.resolutions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::provider::MockPatternProvider;
    use crate::platforms::PlatformRegistry;
    use std::time::Duration;

    fn langfuse() -> Arc<dyn PlatformDescriptor> {
        let mut builder = PlatformRegistry::builder();
        builder.with_builtins();
        builder.build().unwrap().get("langfuse").unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_requests_resolve_once() {
        let mut provider = MockPatternProvider::new();
        provider.expect_lookup().times(1).returning(|framework, _, _| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(InstrumentationPattern::new(format!("docs/{framework}")).with_import("import os"))
        });

        let cache = Arc::new(PatternCache::new(Some(Arc::new(provider))));
        let platform = langfuse();
        let config = InstrumentConfig::default();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let platform = platform.clone();
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .resolve("crewai", "*", platform.as_ref(), &[], &config)
                    .await
            }));
        }

        for handle in handles {
            let pattern = handle.await.unwrap().unwrap();
            assert_eq!(pattern.id, "docs/crewai");
        }
        assert_eq!(cache.resolutions(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let mut provider = MockPatternProvider::new();
        provider.expect_lookup().times(1).returning(|_, _, _| {
            Ok(InstrumentationPattern::new("docs/bad")
                .with_call_site(crate::patterns::CallSiteRule::new("not valid", "x")))
        });

        let cache = PatternCache::new(Some(Arc::new(provider)));
        let platform = langfuse();
        let config = InstrumentConfig::default();

        let first = cache.resolve("crewai", "*", platform.as_ref(), &[], &config).await;
        let second = cache.resolve("crewai", "*", platform.as_ref(), &[], &config).await;
        assert!(matches!(first, Err(PatternError::Invalid { .. })));
        assert_eq!(first.unwrap_err(), second.unwrap_err());
        assert_eq!(cache.resolutions(), 1);
    }

    #[tokio::test]
    async fn test_fallback_when_provider_fails_or_absent() {
        let mut provider = MockPatternProvider::new();
        provider
            .expect_lookup()
            .returning(|_, _, _| Err(PatternError::ProviderFailed("timeout".to_string())));

        let platform = langfuse();
        let config = InstrumentConfig::default();

        let cache = PatternCache::new(Some(Arc::new(provider)));
        let pattern = cache
            .resolve("langchain", "*", platform.as_ref(), &[], &config)
            .await
            .unwrap();
        assert_eq!(pattern.id, "langfuse/langchain");

        let cache = PatternCache::new(None);
        let pattern = cache
            .resolve("autogen", "*", platform.as_ref(), &[], &config)
            .await
            .unwrap();
        assert_eq!(pattern.id, "langfuse/default");
    }

    #[tokio::test]
    async fn test_keys_include_version() {
        let mut provider = MockPatternProvider::new();
        provider
            .expect_lookup()
            .times(2)
            .returning(|_, version, _| Ok(InstrumentationPattern::new(format!("v{version}"))));

        let cache = PatternCache::new(Some(Arc::new(provider)));
        let platform = langfuse();
        let config = InstrumentConfig::default();

        cache.resolve("crewai", "1", platform.as_ref(), &[], &config).await.unwrap();
        cache.resolve("crewai", "2", platform.as_ref(), &[], &config).await.unwrap();
        cache.resolve("crewai", "1", platform.as_ref(), &[], &config).await.unwrap();
        assert_eq!(cache.resolutions(), 2);
    }
}
