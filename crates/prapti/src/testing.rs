//! Test fixtures shared by the unit tests.

use std::sync::Arc;

use crate::action::{ActionOutput, FnAction};
use crate::config::FieldSchema;
use crate::document::Message;
use crate::error::ResponderError;
use crate::plugin::{Plugin, PluginCatalog, PluginRegistrar};
use crate::responder::{Responder, ResponderContext, ResponderFactory};

/// Responder plugin that answers with `responders.<name>.reply`, or with a
/// transcript of its input when `transcript = true`.
pub struct EchoPlugin;

impl EchoPlugin {
    pub const NAME: &'static str = "test.echo";
}

impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn description(&self) -> &str {
        "echoes a fixed reply"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        registrar.declare_config("greeting", FieldSchema::string("hello"));
        registrar.add_action(
            "echo.say",
            FnAction::new(|args, _| Ok(ActionOutput::Text(format!("{args}\n")))),
        );
        registrar.add_action(
            "echo.get",
            FnAction::new(|args, ctx| {
                let value = ctx.state.config.get(args)?;
                Ok(ActionOutput::Text(format!("{value}\n")))
            }),
        );
        registrar.add_action(
            "echo.ask",
            FnAction::new(|args, ctx| {
                let responder = (!args.is_empty()).then_some(args);
                let replies = ctx.generate(responder)?;
                let text: Vec<String> = replies.iter().map(Message::text).collect();
                Ok(ActionOutput::Text(format!("{}\n", text.join("\n"))))
            }),
        );
        registrar.set_responder_factory(EchoFactory);
    }
}

struct EchoFactory;

impl ResponderFactory for EchoFactory {
    fn configuration(&self) -> Vec<(String, FieldSchema)> {
        vec![
            ("reply".into(), FieldSchema::string("pong")),
            ("transcript".into(), FieldSchema::bool(false)),
            ("temperature".into(), FieldSchema::float(1.0)),
            ("model".into(), FieldSchema::string("echo")),
        ]
    }

    fn create(&self, _name: &str) -> Result<Arc<dyn Responder>, ResponderError> {
        Ok(Arc::new(EchoResponder))
    }
}

struct EchoResponder;

impl Responder for EchoResponder {
    fn generate(
        &self,
        messages: &[Message],
        ctx: &ResponderContext<'_>,
    ) -> Result<Vec<Message>, ResponderError> {
        ctx.check_cancelled()?;
        let text = if ctx.config.get_bool("transcript") == Some(true) {
            messages
                .iter()
                .map(|m| format!("{}: {}", m.role, m.text()))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            ctx.config.get_str("reply").unwrap_or_default().to_string()
        };
        Ok(vec![Message::with_content("assistant", text)])
    }
}

/// Registers `echo.say`, clashing with [`EchoPlugin`].
pub struct ConflictPlugin;

impl Plugin for ConflictPlugin {
    fn name(&self) -> &str {
        "test.conflict"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        registrar.declare_config("marker", FieldSchema::bool(true));
        registrar.add_action("echo.say", FnAction::new(|_, _| Ok(ActionOutput::None)));
    }
}

/// Requires [`EchoPlugin`].
pub struct DependentPlugin;

impl Plugin for DependentPlugin {
    fn name(&self) -> &str {
        "test.dependent"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        registrar.require(EchoPlugin::NAME);
        registrar.add_action(
            "dependent.ping",
            FnAction::new(|_, _| Ok(ActionOutput::Text("ping\n".into()))),
        );
    }
}

/// Responder that always fails.
pub struct FailingPlugin;

impl Plugin for FailingPlugin {
    fn name(&self) -> &str {
        "test.failing"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        registrar.set_responder_factory(FailingFactory);
    }
}

struct FailingFactory;

impl ResponderFactory for FailingFactory {
    fn create(&self, _name: &str) -> Result<Arc<dyn Responder>, ResponderError> {
        Ok(Arc::new(FailingResponder))
    }
}

struct FailingResponder;

impl Responder for FailingResponder {
    fn generate(
        &self,
        _messages: &[Message],
        _ctx: &ResponderContext<'_>,
    ) -> Result<Vec<Message>, ResponderError> {
        Err(ResponderError::Backend("quota exceeded".into()))
    }
}

pub fn catalog() -> PluginCatalog {
    PluginCatalog::new()
        .with(EchoPlugin)
        .with(ConflictPlugin)
        .with(DependentPlugin)
        .with(FailingPlugin)
}
