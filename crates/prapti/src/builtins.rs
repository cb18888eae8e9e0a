//! Actions available in every run: plugin loading and responder management.

use std::sync::Arc;

use tracing::debug;

use crate::action::{ActionContext, ActionOutput, ActionRegistry, FnAction};
use crate::config::keys;
use crate::document::Message;
use crate::error::{ActionError, LineError};

/// Owner name recorded for built-in actions.
pub const BUILTINS_OWNER: &str = "prapti.builtins";

type Handler = fn(&str, &mut ActionContext<'_>) -> Result<ActionOutput, ActionError>;

const BUILTINS: [(&str, Handler); 5] = [
    ("plugins.load", plugins_load),
    ("!plugins.list", plugins_list),
    ("responder.new", responder_new),
    ("responder.push", responder_push),
    ("responder.pop", responder_pop),
];

/// Register the built-in actions into a fresh registry.
pub(crate) fn register(actions: &mut ActionRegistry) {
    for (name, handler) in BUILTINS {
        if let Err(e) = actions.register_shared(BUILTINS_OWNER, name, Arc::new(FnAction::new(handler))) {
            debug!("skipping built-in action: {e}");
        }
    }
}

/// `% plugins.load <plugin>`
fn plugins_load(args: &str, ctx: &mut ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let name = args.trim();
    if name.is_empty() {
        return Err(LineError::action("plugins.load", "expected a plugin name").into());
    }
    ctx.state.load_plugin(name)?;
    Ok(ActionOutput::None)
}

/// `% !plugins.list`: emits a disabled `_prapti/plugins` message.
fn plugins_list(_args: &str, ctx: &mut ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let loader = &ctx.state.plugins;
    let catalog = loader.catalog();
    let content = if catalog.is_empty() {
        "No plugins found.".to_string()
    } else {
        let lines: Vec<String> = catalog
            .iter()
            .map(|plugin| {
                let loaded = if loader.is_loaded(plugin.name()) {
                    " (loaded)"
                } else {
                    ""
                };
                format!(
                    "- **`{}`** {}: {}{loaded}",
                    plugin.name(),
                    plugin.version(),
                    plugin.description()
                )
            })
            .collect();
        format!("Available plugins:\n\n{}", lines.join("\n"))
    };
    Ok(ActionOutput::Message(
        Message::with_content("_prapti", content)
            .with_name(Some("plugins"))
            .with_enabled(false),
    ))
}

/// `% responder.new <responder> <plugin>`
fn responder_new(args: &str, ctx: &mut ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let mut parts = args.split_whitespace();
    let (Some(name), Some(plugin), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(LineError::action(
            "responder.new",
            "expected `responder.new <responder-name> <plugin-name>`",
        )
        .into());
    };
    ctx.state.create_responder(name, plugin)?;
    Ok(ActionOutput::None)
}

/// `% responder.push <responder>`
fn responder_push(args: &str, ctx: &mut ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let name = args.trim();
    if name.is_empty() {
        return Err(LineError::action("responder.push", "expected a responder name").into());
    }
    let mut stack = ctx.state.config.responder_stack();
    stack.push(name.to_string());
    ctx.state.config.set(keys::RESPONDER_STACK, stack.into())?;
    Ok(ActionOutput::None)
}

/// `% responder.pop`
fn responder_pop(_args: &str, ctx: &mut ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let mut stack = ctx.state.config.responder_stack();
    if stack.pop().is_none() {
        debug!("responder.pop: stack is already empty");
        return Ok(ActionOutput::None);
    }
    ctx.state.config.set(keys::RESPONDER_STACK, stack.into())?;
    Ok(ActionOutput::None)
}
