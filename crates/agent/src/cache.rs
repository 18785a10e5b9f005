//! Context cache: the server-side copy of the system prompt and tools.
//!
//! The cached context is keyed by a fingerprint of what went into it. Before
//! each agent call [`ContextCache::ensure_current`] recreates it when the
//! fingerprint changed or the handle is about to expire. If recreation
//! fails the call goes out with the context inline instead.

use chrono::Utc;
use gemcode_core::error::ProviderError;
use gemcode_core::provider::{CacheHandle, CacheRequest, ModelClient};
use gemcode_core::tool::ToolDeclaration;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Handles expiring within this margin are treated as already gone.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// What the cached context contains.
#[derive(Debug, Clone)]
pub struct CacheSpec {
    pub model: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
}

impl CacheSpec {
    /// SHA-256 over the model, system instruction and tool declarations.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.model.as_bytes());
        hasher.update([0]);
        hasher.update(self.system_instruction.as_bytes());
        hasher.update([0]);
        for tool in &self.tools {
            hasher.update(tool.name.as_bytes());
            hasher.update(tool.description.as_bytes());
            hasher.update(tool.json_schema().to_string().as_bytes());
            hasher.update([0]);
        }
        format!("{:x}", hasher.finalize())
    }

    fn request(&self, ttl: Duration) -> CacheRequest {
        CacheRequest {
            model: self.model.clone(),
            system_instruction: self.system_instruction.clone(),
            tools: self.tools.clone(),
            ttl,
        }
    }
}

pub struct ContextCache {
    client: Arc<dyn ModelClient>,
    ttl: Duration,
    enabled: bool,
    current: Option<(CacheHandle, String)>,
}

impl ContextCache {
    /// A cache that never creates anything; every call carries its context inline.
    pub fn disabled(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            ttl: Duration::ZERO,
            enabled: false,
            current: None,
        }
    }

    /// Create the cached context. Failing here is fatal to startup.
    pub async fn acquire(
        client: Arc<dyn ModelClient>,
        spec: &CacheSpec,
        ttl: Duration,
    ) -> Result<Self, ProviderError> {
        let handle = client.create_cache(spec.request(ttl)).await?;
        info!(cache = %handle.name, expires_at = %handle.expires_at, "Context cache created");
        Ok(Self {
            client,
            ttl,
            enabled: true,
            current: Some((handle, spec.fingerprint())),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn handle(&self) -> Option<&CacheHandle> {
        self.current.as_ref().map(|(handle, _)| handle)
    }

    /// The cache name to use for the next call, or `None` to send the
    /// context inline.
    pub async fn ensure_current(&mut self, spec: &CacheSpec) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let fingerprint = spec.fingerprint();
        if let Some((handle, current)) = &self.current {
            let stale = *current != fingerprint;
            let expiring = handle.expires_within(Utc::now(), EXPIRY_MARGIN);
            if !stale && !expiring {
                return Some(handle.name.clone());
            }
            debug!(stale, expiring, cache = %handle.name, "Refreshing context cache");
        }

        if let Some((old, _)) = self.current.take() {
            if let Err(e) = self.client.delete_cache(&old).await {
                debug!(cache = %old.name, error = %e, "Could not delete previous context cache");
            }
        }

        match self.client.create_cache(spec.request(self.ttl)).await {
            Ok(handle) => {
                info!(cache = %handle.name, "Context cache recreated");
                let name = handle.name.clone();
                self.current = Some((handle, fingerprint));
                Some(name)
            }
            Err(e) => {
                warn!(error = %e, "Context cache recreation failed, sending context inline");
                None
            }
        }
    }

    /// Delete the cached context. Failures are logged only.
    pub async fn release(&mut self) {
        if let Some((handle, _)) = self.current.take() {
            match self.client.delete_cache(&handle).await {
                Ok(()) => info!(cache = %handle.name, "Context cache released"),
                Err(e) => warn!(cache = %handle.name, error = %e, "Context cache release failed"),
            }
        }
    }
}
