//! Hook specifications — typed extension points and aggregation policies.

use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How results of multiple implementations combine into one `fire` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Every non-empty result, in module-activation order.
    CollectAll,
    /// The first non-empty result; later implementations are not called.
    FirstNonEmpty,
    /// The last non-empty result ("last contributor wins"). Implementations
    /// are visited from the end and the scan stops at the first hit.
    LastNonEmpty,
}

impl AggregationPolicy {
    /// Returns the policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectAll => "collect_all",
            Self::FirstNonEmpty => "first_non_empty",
            Self::LastNonEmpty => "last_non_empty",
        }
    }
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Values a hook implementation may contribute.
///
/// `is_empty` decides whether a contribution is skipped during aggregation.
pub trait HookOutput: Send + 'static {
    /// Whether this value counts as "no contribution".
    fn is_empty(&self) -> bool {
        false
    }
}

impl HookOutput for String {
    fn is_empty(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T: Send + 'static> HookOutput for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<K: Send + 'static, V: Send + 'static> HookOutput for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

impl<K: Send + 'static, V: Send + 'static, S: Send + 'static> HookOutput for HashMap<K, V, S> {
    fn is_empty(&self) -> bool {
        HashMap::is_empty(self)
    }
}

impl HookOutput for serde_json::Value {
    fn is_empty(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            serde_json::Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }
}

impl HookOutput for bool {}
impl HookOutput for i64 {}
impl HookOutput for u64 {}
impl HookOutput for f64 {}

impl<T: ?Sized + Send + Sync + 'static> HookOutput for Arc<T> {}

/// Contract of a hook: argument type, result type and aggregation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookSignature {
    args: TypeId,
    output: TypeId,
    policy: AggregationPolicy,
    args_name: &'static str,
    output_name: &'static str,
}

impl HookSignature {
    /// Signature for argument type `A` and result type `R` under `policy`.
    pub fn of<A: 'static, R: 'static>(policy: AggregationPolicy) -> Self {
        Self {
            args: TypeId::of::<A>(),
            output: TypeId::of::<R>(),
            policy,
            args_name: type_name::<A>(),
            output_name: type_name::<R>(),
        }
    }

    /// Whether two signatures describe the same types and policy.
    pub fn matches(&self, other: &HookSignature) -> bool {
        self.args == other.args && self.output == other.output && self.policy == other.policy
    }

    /// Aggregation policy part of the contract.
    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }
}

impl fmt::Display for HookSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn(&{}) -> {} [{}]", self.args_name, self.output_name, self.policy)
    }
}

/// A typed handle naming an extension point.
///
/// The same `HookSpec` value is used to define, register against, and fire
/// the hook, so argument and result types line up at compile time. Two specs
/// with the same name but different types or policies are caught when
/// registering and firing.
pub struct HookSpec<A, R> {
    name: Cow<'static, str>,
    policy: AggregationPolicy,
    _contract: PhantomData<fn(&A) -> R>,
}

impl<A, R> HookSpec<A, R> {
    /// Declares a hook with a static name.
    pub const fn new(name: &'static str, policy: AggregationPolicy) -> Self {
        Self {
            name: Cow::Borrowed(name),
            policy,
            _contract: PhantomData,
        }
    }

    /// Declares a hook with a name built at runtime.
    pub fn named(name: impl Into<String>, policy: AggregationPolicy) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            policy,
            _contract: PhantomData,
        }
    }

    /// Hook name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Aggregation policy requested by this spec.
    pub fn policy(&self) -> AggregationPolicy {
        self.policy
    }
}

impl<A: 'static, R: 'static> HookSpec<A, R> {
    /// The signature this spec stands for.
    pub fn signature(&self) -> HookSignature {
        HookSignature::of::<A, R>(self.policy)
    }
}

impl<A, R> Clone for HookSpec<A, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            policy: self.policy,
            _contract: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for HookSpec<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSpec")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}

/// A defined extension point as stored by the dispatcher.
#[derive(Debug, Clone)]
pub struct HookDefinition {
    /// Hook name.
    pub name: String,
    /// Aggregation policy fixed at definition time.
    pub policy: AggregationPolicy,
    /// Argument/result types.
    pub signature: HookSignature,
    /// Module (or `host`) that defined the hook.
    pub defined_by: String,
}
