//! Echo plugin - answers `ping` with `pong`

use async_trait::async_trait;
use crate::application::errors::PluginError;
use crate::domain::traits::Handler;
use crate::plugins::context::PluginContext;
use crate::plugins::trait_def::{Cleanup, Plugin};

pub const NAME: &str = "echo";

#[derive(Debug, Default)]
pub struct EchoPlugin;

impl EchoPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Replies pong to ping"
    }

    async fn setup(&self, ctx: PluginContext) -> Result<Option<Cleanup>, PluginError> {
        let responder = ctx.clone();
        ctx.on_message(Handler::new(move |event| {
            let ctx = responder.clone();
            async move {
                let Some(message) = event.as_message() else {
                    return Ok(());
                };
                if message.text() == "ping" {
                    ctx.respond(message, "pong").await?;
                }
                Ok(())
            }
        }))?;
        Ok(None)
    }
}
