//! Plugins shipped with the `prapti` binary.

mod include;
mod openai_chat;
mod test_plugins;

pub use include::IncludePlugin;
pub use openai_chat::{API_KEY_VARS, DEFAULT_API_BASE, DEFAULT_MODEL, OpenAiChatPlugin, api_key_from};
pub use test_plugins::{TEST_REPLY, TestActionsPlugin, TestConfigPlugin, TestResponderPlugin};

use prapti::plugin::PluginCatalog;

/// Every plugin the binary can load.
pub fn builtin_catalog() -> PluginCatalog {
    PluginCatalog::new()
        .with(OpenAiChatPlugin)
        .with(IncludePlugin)
        .with(TestResponderPlugin)
        .with(TestActionsPlugin)
        .with(TestConfigPlugin)
}
