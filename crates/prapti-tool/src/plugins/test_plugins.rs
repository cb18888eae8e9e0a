//! Plugins used to exercise the tool: a canned responder, no-op actions
//! and a plugin that only declares configuration.

use std::sync::Arc;

use prapti::action::{ActionOutput, FnAction};
use prapti::config::FieldSchema;
use prapti::document::Message;
use prapti::error::ResponderError;
use prapti::plugin::{Plugin, PluginRegistrar};
use prapti::responder::{Responder, ResponderContext, ResponderFactory};
use tracing::debug;

/// Reply produced by [`TestResponderPlugin`].
pub const TEST_REPLY: &str = "Test!";

/// One field of every value kind.
fn typed_fields() -> Vec<(String, FieldSchema)> {
    vec![
        ("a_bool".into(), FieldSchema::bool(false)),
        ("an_int".into(), FieldSchema::int(0)),
        ("a_float".into(), FieldSchema::float(0.0)),
        ("a_string".into(), FieldSchema::string("test")),
        ("a_list_of_strings".into(), FieldSchema::string_list()),
    ]
}

pub struct TestResponderPlugin;

impl Plugin for TestResponderPlugin {
    fn name(&self) -> &str {
        "prapti.test.test_responder"
    }

    fn description(&self) -> &str {
        "Responder used to test prapti"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        registrar.set_responder_factory(TestResponderFactory);
    }
}

struct TestResponderFactory;

impl ResponderFactory for TestResponderFactory {
    fn configuration(&self) -> Vec<(String, FieldSchema)> {
        let mut fields = typed_fields();
        fields.extend([
            ("temperature".into(), FieldSchema::float(1.0)),
            ("model".into(), FieldSchema::string("test")),
            ("n".into(), FieldSchema::int(1)),
        ]);
        fields
    }

    fn create(&self, _name: &str) -> Result<Arc<dyn Responder>, ResponderError> {
        Ok(Arc::new(TestResponder))
    }
}

struct TestResponder;

impl Responder for TestResponder {
    fn generate(
        &self,
        messages: &[Message],
        ctx: &ResponderContext<'_>,
    ) -> Result<Vec<Message>, ResponderError> {
        ctx.check_cancelled()?;
        debug!(
            "{}: {} message(s), config {}",
            ctx.name,
            messages.len(),
            ctx.config.to_value()
        );
        Ok(vec![Message::with_content("assistant", TEST_REPLY)])
    }
}

pub struct TestActionsPlugin;

impl Plugin for TestActionsPlugin {
    fn name(&self) -> &str {
        "prapti.test.test_actions"
    }

    fn description(&self) -> &str {
        "Actions used to test prapti"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        for name in ["test.test", "teest.test", "teast.test"] {
            registrar.add_action(
                name,
                FnAction::new(move |args, ctx| {
                    debug!("{}: {name} {args:?}", ctx.location);
                    Ok(ActionOutput::None)
                }),
            );
        }
    }
}

pub struct TestConfigPlugin;

impl Plugin for TestConfigPlugin {
    fn name(&self) -> &str {
        "prapti.test.test_config"
    }

    fn description(&self) -> &str {
        "Plugin used to test prapti"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        for (field, schema) in typed_fields() {
            registrar.declare_config(field, schema);
        }
    }
}
