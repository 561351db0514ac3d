//! Hook registry — defined extension points and their implementations,
//! kept in module-activation order.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use apphost_core::result::AppResult;

use crate::error::ModuleError;
use crate::manifest::module_key;

use super::definitions::{HookDefinition, HookOutput, HookSignature, HookSpec};

/// Trait for hook implementations.
///
/// Returning `Ok(None)` means "no contribution". Errors are logged by the
/// dispatcher and excluded from the aggregate; they never reach the caller
/// of `fire`.
#[async_trait]
pub trait HookHandler<A, R>: Send + Sync
where
    A: Sync + 'static,
    R: HookOutput,
{
    /// Handles a hook invocation.
    async fn handle(&self, args: &A) -> AppResult<Option<R>>;
}

/// Owner label for hooks defined by the host rather than a module.
pub const HOST_OWNER: &str = "host";

/// One registered implementation.
struct HookEntry {
    /// Display name of the owning module.
    module: String,
    /// Rank of the owning module in the activation order.
    rank: usize,
    /// Registration sequence, breaks ties within a module.
    seq: u64,
    /// `Arc<dyn HookHandler<A, R>>`, erased.
    handler: Arc<dyn Any + Send + Sync>,
}

/// A defined hook with its implementations.
struct HookSlot {
    definition: HookDefinition,
    entries: Vec<HookEntry>,
}

/// Registry of hook definitions and implementations.
pub struct HookRegistry {
    /// Hook name → slot.
    slots: RwLock<HashMap<String, HookSlot>>,
    /// Module key → position in the activation order.
    ranks: RwLock<HashMap<String, usize>>,
    /// Monotonic registration counter.
    seq: AtomicU64,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("seq", &self.seq.load(Ordering::Relaxed))
            .finish()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ranks: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Records the module activation order used to sort implementations.
    ///
    /// Implementations registered by modules outside this order run last.
    pub async fn set_activation_order(&self, order: &[String]) {
        let ranks: HashMap<String, usize> = order
            .iter()
            .enumerate()
            .map(|(rank, name)| (module_key(name), rank))
            .collect();
        *self.ranks.write().await = ranks;

        let ranks = self.ranks.read().await;
        let mut slots = self.slots.write().await;
        for slot in slots.values_mut() {
            for entry in &mut slot.entries {
                entry.rank = ranks.get(&module_key(&entry.module)).copied().unwrap_or(usize::MAX);
            }
            slot.entries.sort_by_key(|e| (e.rank, e.seq));
        }
    }

    /// Defines a hook. Fails with `DuplicateHook` when the name is taken.
    pub async fn define<A: 'static, R: 'static>(
        &self,
        defined_by: &str,
        spec: &HookSpec<A, R>,
    ) -> Result<(), ModuleError> {
        let mut slots = self.slots.write().await;

        if let Some(existing) = slots.get(spec.name()) {
            return Err(ModuleError::DuplicateHook {
                hook: spec.name().to_string(),
                defined_by: existing.definition.defined_by.clone(),
            });
        }

        let definition = HookDefinition {
            name: spec.name().to_string(),
            policy: spec.policy(),
            signature: spec.signature(),
            defined_by: defined_by.to_string(),
        };

        info!(
            hook = %definition.name,
            policy = %definition.policy,
            defined_by = %defined_by,
            "Hook defined"
        );

        slots.insert(
            definition.name.clone(),
            HookSlot {
                definition,
                entries: Vec::new(),
            },
        );
        Ok(())
    }

    /// Registers an implementation for a defined hook.
    pub async fn register<A, R>(
        &self,
        module: &str,
        spec: &HookSpec<A, R>,
        handler: Arc<dyn HookHandler<A, R>>,
    ) -> Result<(), ModuleError>
    where
        A: Sync + 'static,
        R: HookOutput,
    {
        let rank = self
            .ranks
            .read()
            .await
            .get(&module_key(module))
            .copied()
            .unwrap_or(usize::MAX);

        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(spec.name())
            .ok_or_else(|| ModuleError::UnknownHook(spec.name().to_string()))?;

        check_signature(&slot.definition, &spec.signature())?;

        slot.entries.push(HookEntry {
            module: module.to_string(),
            rank,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            handler: Arc::new(handler),
        });
        slot.entries.sort_by_key(|e| (e.rank, e.seq));

        info!(
            hook = %spec.name(),
            module = %module,
            "Hook implementation registered"
        );
        Ok(())
    }

    /// Returns the definition and the ordered implementations of a hook.
    pub async fn handlers<A, R>(
        &self,
        spec: &HookSpec<A, R>,
    ) -> Result<(HookDefinition, Vec<(String, Arc<dyn HookHandler<A, R>>)>), ModuleError>
    where
        A: Sync + 'static,
        R: HookOutput,
    {
        let slots = self.slots.read().await;
        let slot = slots
            .get(spec.name())
            .ok_or_else(|| ModuleError::UnknownHook(spec.name().to_string()))?;

        check_signature(&slot.definition, &spec.signature())?;

        let handlers = slot
            .entries
            .iter()
            .filter_map(|entry| {
                entry
                    .handler
                    .downcast_ref::<Arc<dyn HookHandler<A, R>>>()
                    .map(|h| (entry.module.clone(), h.clone()))
            })
            .collect();

        Ok((slot.definition.clone(), handlers))
    }

    /// Removes every implementation registered by a module.
    ///
    /// Returns the number of implementations removed.
    pub async fn unregister_module(&self, module: &str) -> usize {
        let key = module_key(module);
        let mut removed = 0;
        let mut slots = self.slots.write().await;
        for slot in slots.values_mut() {
            let before = slot.entries.len();
            slot.entries.retain(|e| module_key(&e.module) != key);
            removed += before - slot.entries.len();
        }

        debug!(module = %module, removed, "Hook implementations unregistered");
        removed
    }

    /// Returns whether a hook is defined.
    pub async fn is_defined(&self, hook: &str) -> bool {
        self.slots.read().await.contains_key(hook)
    }

    /// All definitions, sorted by name.
    pub async fn definitions(&self) -> Vec<HookDefinition> {
        let slots = self.slots.read().await;
        let mut definitions: Vec<HookDefinition> =
            slots.values().map(|s| s.definition.clone()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Modules implementing a hook, in dispatch order.
    pub async fn implementations(&self, hook: &str) -> Result<Vec<String>, ModuleError> {
        let slots = self.slots.read().await;
        let slot = slots
            .get(hook)
            .ok_or_else(|| ModuleError::UnknownHook(hook.to_string()))?;
        Ok(slot.entries.iter().map(|e| e.module.clone()).collect())
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn check_signature(definition: &HookDefinition, found: &HookSignature) -> Result<(), ModuleError> {
    if definition.signature.matches(found) {
        Ok(())
    } else {
        Err(ModuleError::HookSignatureMismatch {
            hook: definition.name.clone(),
            expected: definition.signature.to_string(),
            found: found.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::definitions::AggregationPolicy;

    #[derive(Debug)]
    struct Fixed(&'static str);

    #[async_trait]
    impl HookHandler<(), String> for Fixed {
        async fn handle(&self, _args: &()) -> AppResult<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    const VIEW: HookSpec<(), String> = HookSpec::new("view", AggregationPolicy::CollectAll);

    #[tokio::test]
    async fn test_duplicate_definition() {
        let registry = HookRegistry::new();
        assert!(!registry.is_defined("view").await);
        registry.define("core", &VIEW).await.unwrap();
        assert!(registry.is_defined("view").await);
        let err = registry.define("billing", &VIEW).await.unwrap_err();
        assert_eq!(
            err,
            ModuleError::DuplicateHook {
                hook: "view".to_string(),
                defined_by: "core".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_register_requires_definition() {
        let registry = HookRegistry::new();
        let err = registry
            .register("billing", &VIEW, Arc::new(Fixed("x")))
            .await
            .unwrap_err();
        assert_eq!(err, ModuleError::UnknownHook("view".to_string()));
    }

    #[tokio::test]
    async fn test_signature_mismatch_on_register() {
        let registry = HookRegistry::new();
        registry.define(HOST_OWNER, &VIEW).await.unwrap();

        struct Count;
        #[async_trait]
        impl HookHandler<(), u64> for Count {
            async fn handle(&self, _args: &()) -> AppResult<Option<u64>> {
                Ok(Some(1))
            }
        }

        let wrong: HookSpec<(), u64> = HookSpec::new("view", AggregationPolicy::CollectAll);
        let err = registry
            .register("billing", &wrong, Arc::new(Count))
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::HookSignatureMismatch { .. }));
        assert!(registry.implementations("view").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_policy_mismatch_on_register() {
        let registry = HookRegistry::new();
        registry.define(HOST_OWNER, &VIEW).await.unwrap();

        let first: HookSpec<(), String> = HookSpec::new("view", AggregationPolicy::FirstNonEmpty);
        let err = registry
            .register("billing", &first, Arc::new(Fixed("b")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ModuleError::HookSignatureMismatch {
                hook: "view".to_string(),
                expected: VIEW.signature().to_string(),
                found: first.signature().to_string(),
            }
        );
        assert!(registry.implementations("view").await.unwrap().is_empty());
        assert!(registry.handlers(&first).await.is_err());
    }

    #[tokio::test]
    async fn test_order_follows_activation_rank() {
        let registry = HookRegistry::new();
        registry.define(HOST_OWNER, &VIEW).await.unwrap();
        registry
            .set_activation_order(&["core".to_string(), "billing".to_string(), "reports".to_string()])
            .await;

        registry.register("reports", &VIEW, Arc::new(Fixed("r"))).await.unwrap();
        registry.register("Core", &VIEW, Arc::new(Fixed("c"))).await.unwrap();
        registry.register("billing", &VIEW, Arc::new(Fixed("b"))).await.unwrap();
        registry.register("core", &VIEW, Arc::new(Fixed("c2"))).await.unwrap();

        assert_eq!(
            registry.implementations("view").await.unwrap(),
            vec!["Core", "core", "billing", "reports"]
        );

        assert_eq!(registry.unregister_module("CORE").await, 2);
        assert_eq!(
            registry.implementations("view").await.unwrap(),
            vec!["billing", "reports"]
        );
    }
}
