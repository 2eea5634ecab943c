//! Contract for the virtualization control plane.
//!
//! A domain is addressed by name. Every VM's domain is named after its
//! user-facing VM id. Implementations wrap the hypervisor management API;
//! the orchestrator only depends on this trait.

use crate::core::{
    domain::{
        error::{ControlPlaneError, VmmResult},
        model::domain_state::{DomainHandle, DomainState},
    },
    infrastructure::config::RateLimitConfig,
};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use std::sync::Arc;
use tracing::trace;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Finds a defined domain by name. `Ok(None)` if no such domain exists.
    async fn lookup_domain(&self, name: &str) -> Result<Option<DomainHandle>, ControlPlaneError>;

    async fn domain_state(&self, domain: &DomainHandle) -> Result<DomainState, ControlPlaneError>;

    /// The persistent descriptor document of the domain.
    async fn descriptor(&self, domain: &DomainHandle) -> Result<String, ControlPlaneError>;

    /// Registers a descriptor. If a domain with the same name exists and the
    /// backend supports it, the definition is replaced in place.
    async fn define(&self, descriptor: &str) -> Result<DomainHandle, ControlPlaneError>;

    async fn undefine(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError>;

    async fn start(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError>;

    /// Requests a graceful guest shutdown.
    async fn shutdown(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError>;

    /// Forcefully stops the domain.
    async fn destroy(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError>;

    async fn reboot(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError>;

    /// True if `define` on an existing name replaces the definition
    /// atomically, without a separate `undefine`.
    fn supports_atomic_redefine(&self) -> bool {
        false
    }
}

/// A [`ControlPlane`] that waits on a token bucket before every call.
pub struct RateLimitedControlPlane {
    inner: Arc<dyn ControlPlane>,
    limiter: DefaultDirectRateLimiter,
}

impl RateLimitedControlPlane {
    /// Wraps `inner` with the given quota.
    ///
    /// # Errors
    /// Returns `VmmError::Configuration` if the rate or burst is zero.
    pub fn new(inner: Arc<dyn ControlPlane>, limit: RateLimitConfig) -> VmmResult<Self> {
        let (rate, burst) = limit.quota_parts()?;
        let quota = Quota::per_second(rate).allow_burst(burst);
        Ok(Self {
            inner,
            limiter: DefaultDirectRateLimiter::direct(quota),
        })
    }

    async fn ready(&self, operation: &'static str) {
        self.limiter.until_ready().await;
        trace!(operation, "control plane permit acquired");
    }
}

#[async_trait]
impl ControlPlane for RateLimitedControlPlane {
    async fn lookup_domain(&self, name: &str) -> Result<Option<DomainHandle>, ControlPlaneError> {
        self.ready("lookup").await;
        self.inner.lookup_domain(name).await
    }

    async fn domain_state(&self, domain: &DomainHandle) -> Result<DomainState, ControlPlaneError> {
        self.ready("state").await;
        self.inner.domain_state(domain).await
    }

    async fn descriptor(&self, domain: &DomainHandle) -> Result<String, ControlPlaneError> {
        self.ready("descriptor").await;
        self.inner.descriptor(domain).await
    }

    async fn define(&self, descriptor: &str) -> Result<DomainHandle, ControlPlaneError> {
        self.ready("define").await;
        self.inner.define(descriptor).await
    }

    async fn undefine(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.ready("undefine").await;
        self.inner.undefine(domain).await
    }

    async fn start(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.ready("start").await;
        self.inner.start(domain).await
    }

    async fn shutdown(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.ready("shutdown").await;
        self.inner.shutdown(domain).await
    }

    async fn destroy(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.ready("destroy").await;
        self.inner.destroy(domain).await
    }

    async fn reboot(&self, domain: &DomainHandle) -> Result<(), ControlPlaneError> {
        self.ready("reboot").await;
        self.inner.reboot(domain).await
    }

    fn supports_atomic_redefine(&self) -> bool {
        self.inner.supports_atomic_redefine()
    }
}
