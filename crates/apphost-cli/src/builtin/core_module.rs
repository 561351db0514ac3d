//! The `core` system module: navigation shell.

use apphost_module::prelude::*;

/// Contributes the navigation shell to every view.
#[derive(Debug)]
pub struct CoreModule;

#[async_trait]
impl Module for CoreModule {
    fn name(&self) -> &str {
        "core"
    }

    async fn activate(&self, ctx: &mut ActivationContext<'_>) -> AppResult<()> {
        ctx.register_fn(&MODIFY_VIEW, |_: &()| {
            Ok(Some(vec![r#"<nav class="core-nav"></nav>"#.to_string()]))
        })
        .await?;
        Ok(())
    }
}
