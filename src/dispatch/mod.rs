//! Delegation of business events to the external runner.

pub mod alias;
pub mod case;
pub mod client;
pub mod events;
pub mod plan;
pub mod routing;
pub mod transport;

pub use alias::{AliasNotFound, ALIAS_TABLE_VERSION};
pub use case::{from_runner_case, to_runner_case};
pub use client::{
    build_envelope, DispatchClient, DispatchCore, DispatchError, Dispatched, EntityRef,
    RunnerHealth, SideEffectTrigger,
};
pub use events::{EventType, SideEffectKind};
pub use plan::{plan_primary_mutation, plan_primary_read, ExecutionPath};
pub use routing::{DelegationLookup, ResolvedRoute, RouteSource, RoutingError, RoutingResolver};
pub use transport::{RunnerTransport, TransportError, TransportResponse, UreqTransport};
