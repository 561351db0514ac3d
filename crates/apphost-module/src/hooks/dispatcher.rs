//! Hook dispatcher — fires hooks and aggregates implementation results.
//!
//! Implementations run one after another in module-activation order.
//! An implementation that returns an error, panics, or exceeds the per-call
//! timeout is logged and left out of the aggregate; `fire` itself only fails
//! for an undefined hook or a signature mismatch.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error};

use apphost_core::result::AppResult;

use crate::error::ModuleError;

use super::definitions::{AggregationPolicy, HookDefinition, HookOutput, HookSpec};
use super::registry::{HOST_OWNER, HookHandler, HookRegistry};

/// Default upper bound for a single implementation call.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Why an implementation was excluded from an aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HookFailureKind {
    /// The implementation returned an error.
    Error(String),
    /// The implementation panicked.
    Panic(String),
    /// The implementation did not finish within the timeout.
    Timeout,
}

/// A failed implementation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookFailure {
    /// Module owning the implementation.
    pub module: String,
    /// What went wrong.
    pub kind: HookFailureKind,
}

/// One implementation's non-empty result.
#[derive(Debug, Clone)]
pub struct HookContribution<R> {
    /// Module that produced the value.
    pub module: String,
    /// The value.
    pub value: R,
}

/// Aggregated result of firing a hook.
#[derive(Debug, Clone)]
pub struct DispatchResult<R> {
    /// Hook name.
    pub hook: String,
    /// Policy that produced `contributions`.
    pub policy: AggregationPolicy,
    /// Contributions in module-activation order. For the single-result
    /// policies this holds at most one entry.
    pub contributions: Vec<HookContribution<R>>,
    /// Implementations that failed during this dispatch.
    pub failures: Vec<HookFailure>,
}

impl<R> DispatchResult<R> {
    /// Whether no implementation contributed.
    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    /// Modules that contributed, in order.
    pub fn contributors(&self) -> Vec<&str> {
        self.contributions.iter().map(|c| c.module.as_str()).collect()
    }

    /// The contributed values, in order.
    pub fn into_values(self) -> Vec<R> {
        self.contributions.into_iter().map(|c| c.value).collect()
    }

    /// The single contributed value for first/last-non-empty hooks.
    pub fn into_single(self) -> Option<R> {
        self.contributions.into_iter().next().map(|c| c.value)
    }

    /// The single contributed value, or `base` when nobody contributed.
    pub fn single_or(self, base: R) -> R {
        self.into_single().unwrap_or(base)
    }
}

/// Dispatches hooks to all registered implementations.
#[derive(Debug)]
pub struct HookDispatcher {
    /// Hook registry.
    registry: Arc<HookRegistry>,
    /// Per-call timeout.
    timeout: Duration,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher with the default timeout.
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self::with_timeout(registry, DEFAULT_HOOK_TIMEOUT)
    }

    /// Creates a new hook dispatcher with a per-call timeout.
    pub fn with_timeout(registry: Arc<HookRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Defines a host-owned hook.
    pub async fn define<A: 'static, R: 'static>(
        &self,
        spec: &HookSpec<A, R>,
    ) -> Result<(), ModuleError> {
        self.registry.define(HOST_OWNER, spec).await
    }

    /// Defines a hook owned by a module.
    pub async fn define_as<A: 'static, R: 'static>(
        &self,
        owner: &str,
        spec: &HookSpec<A, R>,
    ) -> Result<(), ModuleError> {
        self.registry.define(owner, spec).await
    }

    /// Registers an implementation on behalf of `module`.
    pub async fn register<A, R, H>(
        &self,
        module: &str,
        spec: &HookSpec<A, R>,
        handler: H,
    ) -> Result<(), ModuleError>
    where
        A: Sync + 'static,
        R: HookOutput,
        H: HookHandler<A, R> + 'static,
    {
        self.registry.register(module, spec, Arc::new(handler)).await
    }

    /// Fires a hook and aggregates results per its definition's policy.
    pub async fn fire<A, R>(
        &self,
        spec: &HookSpec<A, R>,
        args: &A,
    ) -> Result<DispatchResult<R>, ModuleError>
    where
        A: Sync + 'static,
        R: HookOutput,
    {
        let (definition, handlers) = self.registry.handlers(spec).await?;

        debug!(
            hook = %definition.name,
            policy = %definition.policy,
            handler_count = handlers.len(),
            "Dispatching hook"
        );

        let mut contributions = Vec::new();
        let mut failures = Vec::new();

        let mut ordered: Vec<&(String, Arc<dyn HookHandler<A, R>>)> = handlers.iter().collect();
        if definition.policy == AggregationPolicy::LastNonEmpty {
            ordered.reverse();
        }

        for (module, handler) in ordered {
            match self.invoke(&definition, module, handler, args).await {
                Ok(Some(value)) if !value.is_empty() => {
                    contributions.push(HookContribution {
                        module: module.clone(),
                        value,
                    });
                    if definition.policy != AggregationPolicy::CollectAll {
                        break;
                    }
                }
                Ok(_) => {
                    debug!(hook = %definition.name, module = %module, "Implementation returned nothing");
                }
                Err(kind) => failures.push(HookFailure {
                    module: module.clone(),
                    kind,
                }),
            }
        }

        Ok(DispatchResult {
            hook: definition.name,
            policy: definition.policy,
            contributions,
            failures,
        })
    }

    /// Runs one implementation with timeout and panic isolation.
    async fn invoke<A, R>(
        &self,
        definition: &HookDefinition,
        module: &str,
        handler: &Arc<dyn HookHandler<A, R>>,
        args: &A,
    ) -> Result<Option<R>, HookFailureKind>
    where
        A: Sync + 'static,
        R: HookOutput,
    {
        let call = AssertUnwindSafe(handler.handle(args)).catch_unwind();

        let outcome: Result<AppResult<Option<R>>, HookFailureKind> =
            match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(panic)) => Err(HookFailureKind::Panic(panic_message(panic.as_ref()))),
                Err(_) => Err(HookFailureKind::Timeout),
            };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(
                    hook = %definition.name,
                    module = %module,
                    error = %e,
                    "Hook implementation failed"
                );
                Err(HookFailureKind::Error(e.to_string()))
            }
            Err(kind) => {
                error!(
                    hook = %definition.name,
                    module = %module,
                    failure = ?kind,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Hook implementation aborted"
                );
                Err(kind)
            }
        }
    }

    /// All hook definitions, sorted by name.
    pub async fn definitions(&self) -> Vec<HookDefinition> {
        self.registry.definitions().await
    }

    /// Modules implementing `hook`, in dispatch order.
    pub async fn implementations(&self, hook: &str) -> Result<Vec<String>, ModuleError> {
        self.registry.implementations(hook).await
    }

    /// Drops every implementation registered by `module`.
    pub async fn unregister_module(&self, module: &str) -> usize {
        self.registry.unregister_module(module).await
    }

    /// Orders implementations by the given module activation order.
    pub async fn set_activation_order(&self, order: &[String]) {
        self.registry.set_activation_order(order).await;
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FnHandler;
    use apphost_core::error::AppError;
    use async_trait::async_trait;

    const VIEW: HookSpec<(), String> = HookSpec::new("modify_view", AggregationPolicy::CollectAll);
    const FIRST: HookSpec<u64, u64> = HookSpec::new("first", AggregationPolicy::FirstNonEmpty);
    const LAST: HookSpec<u64, u64> = HookSpec::new("last", AggregationPolicy::LastNonEmpty);

    async fn dispatcher(order: &[&str]) -> HookDispatcher {
        let registry = Arc::new(HookRegistry::new());
        let order: Vec<String> = order.iter().map(|s| s.to_string()).collect();
        registry.set_activation_order(&order).await;
        HookDispatcher::with_timeout(registry, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_collect_all_skips_failures_and_empties() {
        let d = dispatcher(&["core", "billing", "clock", "reports"]).await;
        d.define(&VIEW).await.unwrap();

        d.register("reports", &VIEW, FnHandler::new(|_: &()| Ok(Some("<reports/>".to_string()))))
            .await
            .unwrap();
        d.register(
            "billing",
            &VIEW,
            FnHandler::new(|_: &()| Err::<Option<String>, _>(AppError::internal("boom"))),
        )
        .await
        .unwrap();
        d.register("core", &VIEW, FnHandler::new(|_: &()| Ok(Some("<core/>".to_string()))))
            .await
            .unwrap();
        d.register("clock", &VIEW, FnHandler::new(|_: &()| Ok(Some(String::new()))))
            .await
            .unwrap();

        let result = d.fire(&VIEW, &()).await.unwrap();
        assert_eq!(result.contributors(), vec!["core", "reports"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].module, "billing");
        assert!(matches!(result.failures[0].kind, HookFailureKind::Error(_)));
        assert_eq!(result.into_values(), vec!["<core/>", "<reports/>"]);
    }

    #[tokio::test]
    async fn test_panicking_implementation_is_isolated() {
        let d = dispatcher(&["a", "b"]).await;
        d.define(&VIEW).await.unwrap();
        d.register("a", &VIEW, FnHandler::new(|_: &()| -> AppResult<Option<String>> {
            panic!("handler exploded")
        }))
        .await
        .unwrap();
        d.register("b", &VIEW, FnHandler::new(|_: &()| Ok(Some("b".to_string()))))
            .await
            .unwrap();

        let result = d.fire(&VIEW, &()).await.unwrap();
        assert_eq!(result.contributors(), vec!["b"]);
        assert_eq!(
            result.failures[0].kind,
            HookFailureKind::Panic("handler exploded".to_string())
        );
    }

    #[tokio::test]
    async fn test_slow_implementation_times_out() {
        struct Slow;

        #[async_trait]
        impl HookHandler<(), String> for Slow {
            async fn handle(&self, _args: &()) -> AppResult<Option<String>> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Some("late".to_string()))
            }
        }

        let d = dispatcher(&["slow", "fast"]).await;
        d.define(&VIEW).await.unwrap();
        d.register("slow", &VIEW, Slow).await.unwrap();
        d.register("fast", &VIEW, FnHandler::new(|_: &()| Ok(Some("fast".to_string()))))
            .await
            .unwrap();

        assert_eq!(d.timeout(), Duration::from_millis(200));
        let result = d.fire(&VIEW, &()).await.unwrap();
        assert_eq!(result.contributors(), vec!["fast"]);
        assert_eq!(result.failures[0].kind, HookFailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_first_non_empty_short_circuits() {
        let d = dispatcher(&["a", "b", "c"]).await;
        d.define(&FIRST).await.unwrap();

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        d.register("a", &FIRST, FnHandler::new(|_: &u64| Ok(None))).await.unwrap();
        d.register("b", &FIRST, FnHandler::new(|n: &u64| Ok(Some(n * 2)))).await.unwrap();
        let counter = calls.clone();
        d.register(
            "c",
            &FIRST,
            FnHandler::new(move |n: &u64| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Some(n * 3))
            }),
        )
        .await
        .unwrap();

        let result = d.fire(&FIRST, &7).await.unwrap();
        assert_eq!(result.contributors(), vec!["b"]);
        assert_eq!(result.into_single(), Some(14));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_last_non_empty_and_fallback() {
        let d = dispatcher(&["a", "b", "c"]).await;
        d.define(&LAST).await.unwrap();

        let empty = d.fire(&LAST, &1).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.single_or(99), 99);

        d.register("a", &LAST, FnHandler::new(|n: &u64| Ok(Some(n + 1)))).await.unwrap();
        d.register("b", &LAST, FnHandler::new(|n: &u64| Ok(Some(n + 2)))).await.unwrap();
        d.register(
            "c",
            &LAST,
            FnHandler::new(|_: &u64| Err::<Option<u64>, _>(AppError::internal("no model"))),
        )
        .await
        .unwrap();

        let result = d.fire(&LAST, &10).await.unwrap();
        assert_eq!(result.contributors(), vec!["b"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.single_or(0), 12);
    }

    #[tokio::test]
    async fn test_fire_rejects_policy_mismatch() {
        const PICK: HookSpec<(), String> = HookSpec::new("pick", AggregationPolicy::CollectAll);
        const PICK_FIRST: HookSpec<(), String> = HookSpec::new("pick", AggregationPolicy::FirstNonEmpty);

        let d = dispatcher(&["a", "b"]).await;
        d.define(&PICK).await.unwrap();
        d.register("a", &PICK, FnHandler::new(|_: &()| Ok(Some("a".to_string()))))
            .await
            .unwrap();

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let err = d
            .register(
                "b",
                &PICK_FIRST,
                FnHandler::new(move |_: &()| {
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(Some("b".to_string()))
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::HookSignatureMismatch { .. }));

        let err = d.fire(&PICK_FIRST, &()).await.unwrap_err();
        match err {
            ModuleError::HookSignatureMismatch { hook, expected, found } => {
                assert_eq!(hook, "pick");
                assert!(expected.ends_with("[collect_all]"));
                assert!(found.ends_with("[first_non_empty]"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(d.fire(&PICK, &()).await.unwrap().contributors(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_fire_undefined_hook() {
        let d = dispatcher(&[]).await;
        let err = d.fire(&VIEW, &()).await.unwrap_err();
        assert_eq!(err, ModuleError::UnknownHook("modify_view".to_string()));
    }
}
