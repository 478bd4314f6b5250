//! Chooses where an operation's authoritative execution happens.

use super::client::DispatchError;
use super::routing::{ResolvedRoute, RouteSource};
use crate::config::LocalFallbackConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPath {
    Delegated(ResolvedRoute),
    LocalDirect,
}

impl ExecutionPath {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Delegated(_) => "delegated",
            Self::LocalDirect => "local_direct",
        }
    }
}

/// Path for a primary-caller mutation. A tenant delegation always wins; an
/// alias-only route runs locally when the fallback policy allows it, and
/// otherwise goes to the runner's default webhook.
///
/// Runner callbacks never reach this function: they are always
/// [`ExecutionPath::LocalDirect`].
pub fn plan_primary_mutation(
    route: ResolvedRoute,
    fallback: &LocalFallbackConfig,
    runner_configured: bool,
) -> Result<ExecutionPath, DispatchError> {
    let delegate = match route.source {
        RouteSource::TenantConfig => true,
        RouteSource::Alias => !fallback.permits(&route.event),
    };
    if !delegate {
        return Ok(ExecutionPath::LocalDirect);
    }
    if !runner_configured {
        return Err(DispatchError::RunnerNotConfigured {
            event: route.event.as_string(),
        });
    }
    Ok(ExecutionPath::Delegated(route))
}

/// Reads are delegated only when the tenant configured it.
pub fn plan_primary_read(
    route: ResolvedRoute,
    runner_configured: bool,
) -> Result<ExecutionPath, DispatchError> {
    match route.source {
        RouteSource::Alias => Ok(ExecutionPath::LocalDirect),
        RouteSource::TenantConfig if runner_configured => Ok(ExecutionPath::Delegated(route)),
        RouteSource::TenantConfig => Err(DispatchError::RunnerNotConfigured {
            event: route.event.as_string(),
        }),
    }
}
