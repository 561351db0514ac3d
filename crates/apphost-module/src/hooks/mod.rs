//! Hook system — typed extension points, implementation registry, dispatcher.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{AggregationPolicy, HookDefinition, HookOutput, HookSignature, HookSpec};
pub use dispatcher::{
    DEFAULT_HOOK_TIMEOUT, DispatchResult, HookContribution, HookDispatcher, HookFailure,
    HookFailureKind,
};
pub use registry::{HOST_OWNER, HookHandler, HookRegistry};
