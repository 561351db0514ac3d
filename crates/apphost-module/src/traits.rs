//! Traits implemented by compiled-in modules.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;

use apphost_core::result::AppResult;

use crate::error::ModuleError;
use crate::hooks::definitions::{HookOutput, HookSpec};
use crate::hooks::dispatcher::HookDispatcher;
use crate::hooks::registry::HookHandler;

/// Code side of a module.
///
/// The manifest describes a module; this trait lets it take part in the
/// running host. `activate` is called once per boot, after every dependency
/// has been activated, and is where the module defines its own hooks and
/// registers implementations of others.
#[async_trait]
pub trait Module: Send + Sync + fmt::Debug {
    /// Name matching the module's manifest (case-insensitive).
    fn name(&self) -> &str;

    /// Activation callback.
    async fn activate(&self, ctx: &mut ActivationContext<'_>) -> AppResult<()>;
}

/// Handle passed to [`Module::activate`], scoped to one module.
#[derive(Debug)]
pub struct ActivationContext<'a> {
    /// Display name of the module being activated.
    module: String,
    /// Dispatcher receiving definitions and implementations.
    dispatcher: &'a HookDispatcher,
    /// Hooks defined through this context.
    defined: Vec<String>,
    /// Number of implementations registered through this context.
    registered: usize,
}

impl<'a> ActivationContext<'a> {
    /// Creates a context for `module`.
    pub fn new(module: impl Into<String>, dispatcher: &'a HookDispatcher) -> Self {
        Self {
            module: module.into(),
            dispatcher,
            defined: Vec::new(),
            registered: 0,
        }
    }

    /// Name of the module being activated.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Defines a hook owned by this module.
    pub async fn define<A: 'static, R: 'static>(
        &mut self,
        spec: &HookSpec<A, R>,
    ) -> Result<(), ModuleError> {
        self.dispatcher.define_as(&self.module, spec).await?;
        self.defined.push(spec.name().to_string());
        Ok(())
    }

    /// Registers an implementation of `spec` for this module.
    pub async fn register<A, R, H>(&mut self, spec: &HookSpec<A, R>, handler: H) -> Result<(), ModuleError>
    where
        A: Sync + 'static,
        R: HookOutput,
        H: HookHandler<A, R> + 'static,
    {
        self.dispatcher.register(&self.module, spec, handler).await?;
        self.registered += 1;
        Ok(())
    }

    /// Registers a plain closure as an implementation of `spec`.
    pub async fn register_fn<A, R, F>(&mut self, spec: &HookSpec<A, R>, f: F) -> Result<(), ModuleError>
    where
        A: Sync + 'static,
        R: HookOutput,
        F: Fn(&A) -> AppResult<Option<R>> + Send + Sync + 'static,
    {
        self.register(spec, FnHandler::new(f)).await
    }

    /// Hooks defined through this context.
    pub fn defined_hooks(&self) -> &[String] {
        &self.defined
    }

    /// Number of implementations registered through this context.
    pub fn registered_count(&self) -> usize {
        self.registered
    }
}

/// A closure-based hook handler for quick handler creation.
pub struct FnHandler<A, R, F> {
    /// Handler function.
    f: F,
    _contract: PhantomData<fn(&A) -> R>,
}

impl<A, R, F> FnHandler<A, R, F>
where
    F: Fn(&A) -> AppResult<Option<R>> + Send + Sync,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _contract: PhantomData,
        }
    }
}

impl<A, R, F> fmt::Debug for FnHandler<A, R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("handler", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl<A, R, F> HookHandler<A, R> for FnHandler<A, R, F>
where
    A: Sync + 'static,
    R: HookOutput,
    F: Fn(&A) -> AppResult<Option<R>> + Send + Sync,
{
    async fn handle(&self, args: &A) -> AppResult<Option<R>> {
        (self.f)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::hooks::definitions::AggregationPolicy;
    use crate::hooks::registry::HookRegistry;

    const GREETING: HookSpec<String, String> =
        HookSpec::new("greeting", AggregationPolicy::CollectAll);

    #[tokio::test]
    async fn test_context_scopes_to_module() {
        let dispatcher = HookDispatcher::new(Arc::new(HookRegistry::new()));

        let mut ctx = ActivationContext::new("core", &dispatcher);
        ctx.define(&GREETING).await.unwrap();
        ctx.register_fn(&GREETING, |name: &String| Ok(Some(format!("hello {name}"))))
            .await
            .unwrap();
        assert_eq!(ctx.defined_hooks(), ["greeting".to_string()]);
        assert_eq!(ctx.registered_count(), 1);

        let definitions = dispatcher.definitions().await;
        assert_eq!(definitions[0].defined_by, "core");
        assert_eq!(
            dispatcher.implementations("greeting").await.unwrap(),
            vec!["core"]
        );

        let result = dispatcher.fire(&GREETING, &"ada".to_string()).await.unwrap();
        assert_eq!(result.into_values(), vec!["hello ada"]);
    }
}
