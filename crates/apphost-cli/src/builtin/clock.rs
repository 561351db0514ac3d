//! The `clock` app module: a clock widget and a timezone setting.

use std::sync::Arc;

use apphost_module::prelude::*;

/// Adds a clock widget and extends the settings model with a timezone.
#[derive(Debug)]
pub struct ClockModule;

/// A model extended with extra fields.
#[derive(Debug)]
struct ExtendedModel {
    base: ModelHandle,
    extra: Vec<String>,
}

impl FormModel for ExtendedModel {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn fields(&self) -> Vec<String> {
        let mut fields = self.base.fields();
        fields.extend(self.extra.iter().cloned());
        fields
    }
}

#[async_trait]
impl Module for ClockModule {
    fn name(&self) -> &str {
        "clock"
    }

    async fn activate(&self, ctx: &mut ActivationContext<'_>) -> AppResult<()> {
        ctx.register_fn(&MODIFY_VIEW, |_: &()| {
            Ok(Some(vec![r#"<div class="clock-widget" data-format="24h"></div>"#.to_string()]))
        })
        .await?;

        ctx.register_fn(&GET_MODEL, |base: &ModelHandle| {
            let model: ModelHandle = Arc::new(ExtendedModel {
                base: base.clone(),
                extra: vec!["timezone".to_string()],
            });
            Ok(Some(model))
        })
        .await?;
        Ok(())
    }
}
