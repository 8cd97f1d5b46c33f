//! Command registry: alias matching and positional argument binding.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bot::command::Command;

/// The full command set for the process lifetime. Built once at startup and
/// passed to the engine; first registration wins on alias collisions.
pub struct CommandRegistry {
    commands: Vec<Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self { commands: Vec::new() }
    }

    pub fn register(&mut self, command: Arc<dyn Command>) {
        self.commands.push(command);
    }

    /// Match raw input against the registered aliases.
    ///
    /// Takes the first whitespace-delimited token and strips a trailing
    /// `@bot_username` (exact case), so `/admin@meetbot` still matches in
    /// group chats where the client appends the bot's handle.
    pub fn resolve(&self, input: &str, bot_username: &str) -> Option<Arc<dyn Command>> {
        let first = input.split_whitespace().next()?;
        let suffix = format!("@{bot_username}");
        let name = first.strip_suffix(suffix.as_str()).unwrap_or(first);
        self.commands
            .iter()
            .find(|c| c.aliases().iter().any(|alias| *alias == name))
            .cloned()
    }

    /// Bind tokens positionally to the command's argument specs.
    ///
    /// Token 0 is the command name and is discarded. A variadic spec absorbs
    /// all remaining tokens space-rejoined. Missing tokens leave specs
    /// unbound (the handler asks for them later); surplus tokens beyond a
    /// non-variadic spec list are dropped.
    pub fn bind_args(command: &dyn Command, tokens: &[String]) -> HashMap<String, String> {
        let mut named = HashMap::new();
        let rest = tokens.get(1..).unwrap_or(&[]);
        for (i, spec) in command.args().iter().enumerate() {
            if i >= rest.len() {
                break;
            }
            if spec.variadic {
                named.insert(spec.name.to_string(), rest[i..].join(" "));
                break;
            }
            named.insert(spec.name.to_string(), rest[i].clone());
        }
        named
    }

    /// `(name, help)` pairs for transport menu registration, with the
    /// command marker stripped from the primary alias.
    pub fn menu(&self) -> Vec<(String, String)> {
        self.commands
            .iter()
            .map(|c| {
                let primary = c.aliases().first().copied().unwrap_or_default();
                let name = primary.strip_prefix('/').unwrap_or(primary);
                (name.to_string(), c.help().to_string())
            })
            .collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::command::{ArgSpec, Invocation};
    use crate::bot::error::BotError;
    use async_trait::async_trait;

    struct FakeCommand {
        aliases: &'static [&'static str],
        args: &'static [ArgSpec],
    }

    #[async_trait]
    impl Command for FakeCommand {
        fn aliases(&self) -> &[&'static str] {
            self.aliases
        }
        fn help(&self) -> &'static str {
            "a fake command"
        }
        fn args(&self) -> &[ArgSpec] {
            self.args
        }
        async fn execute(&self, _inv: &Invocation<'_>) -> Result<(), BotError> {
            Ok(())
        }
    }

    fn registry_with(aliases: &'static [&'static str]) -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(FakeCommand { aliases, args: &[] }));
        registry
    }

    fn tokens(input: &str) -> Vec<String> {
        input.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_resolve_by_alias() {
        let registry = registry_with(&["/admin"]);
        assert!(registry.resolve("/admin", "mybot").is_some());
        assert!(registry.resolve("/admin with args", "mybot").is_some());
        assert!(registry.resolve("/other", "mybot").is_none());
    }

    #[test]
    fn test_resolve_strips_bot_suffix() {
        let registry = registry_with(&["/admin"]);
        assert!(registry.resolve("/admin@mybot", "mybot").is_some());
        // Suffix stripping is an exact, case-sensitive match.
        assert!(registry.resolve("/admin@MyBot", "mybot").is_none());
        assert!(registry.resolve("/admin@otherbot", "mybot").is_none());
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let registry = registry_with(&["/admin"]);
        assert!(registry.resolve("/Admin", "mybot").is_none());
    }

    #[test]
    fn test_resolve_secondary_alias() {
        let registry = registry_with(&["/start", "/help"]);
        assert!(registry.resolve("/help", "mybot").is_some());
    }

    #[test]
    fn test_resolve_empty_input() {
        let registry = registry_with(&["/admin"]);
        assert!(registry.resolve("", "mybot").is_none());
        assert!(registry.resolve("   ", "mybot").is_none());
    }

    #[test]
    fn test_bind_positional_and_variadic() {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::new("a", "a?"),
            ArgSpec::variadic("b", "b?"),
        ];
        let cmd = FakeCommand { aliases: &["/cmd"], args: ARGS };
        let named = CommandRegistry::bind_args(&cmd, &tokens("/cmd x y z"));
        assert_eq!(named.get("a").map(String::as_str), Some("x"));
        assert_eq!(named.get("b").map(String::as_str), Some("y z"));
    }

    #[test]
    fn test_bind_leaves_missing_args_unbound() {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::new("a", "a?"),
            ArgSpec::new("b", "b?"),
            ArgSpec::variadic("c", "c?"),
        ];
        let cmd = FakeCommand { aliases: &["/cmd"], args: ARGS };
        let named = CommandRegistry::bind_args(&cmd, &tokens("/cmd x"));
        assert_eq!(named.get("a").map(String::as_str), Some("x"));
        assert!(!named.contains_key("b"));
        assert!(!named.contains_key("c"));
    }

    #[test]
    fn test_bind_drops_surplus_tokens() {
        const ARGS: &[ArgSpec] = &[ArgSpec::new("a", "a?")];
        let cmd = FakeCommand { aliases: &["/cmd"], args: ARGS };
        let named = CommandRegistry::bind_args(&cmd, &tokens("/cmd x y z"));
        assert_eq!(named.len(), 1);
        assert_eq!(named.get("a").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_bind_no_tokens_at_all() {
        const ARGS: &[ArgSpec] = &[ArgSpec::new("a", "a?")];
        let cmd = FakeCommand { aliases: &["/cmd"], args: ARGS };
        let named = CommandRegistry::bind_args(&cmd, &tokens("/cmd"));
        assert!(named.is_empty());
    }

    #[test]
    fn test_menu_strips_command_marker() {
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(FakeCommand { aliases: &["/start"], args: &[] }));
        registry.register(Arc::new(FakeCommand { aliases: &["/admin", "/a"], args: &[] }));
        let menu = registry.menu();
        assert_eq!(menu[0].0, "start");
        assert_eq!(menu[1].0, "admin");
        assert_eq!(menu[1].1, "a fake command");
    }
}
