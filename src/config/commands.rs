//! Hook command configuration: a vendor's `pre_sync`/`post_sync` commands.
//!
//! Accepts either a single command string or a named map of commands in
//! the YAML source, normalizing both into an ordered `Vec<Command>` so call
//! sites never branch on which form was used.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    pub name: Option<String>,
    pub command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, JsonSchema)]
pub struct CommandConfig {
    commands: Vec<Command>,
}

impl CommandConfig {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<'de> Deserialize<'de> for CommandConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Single(String),
            Named(IndexMap<String, String>),
        }

        let raw = Raw::deserialize(deserializer)?;
        let commands = match raw {
            Raw::Single(command) => vec![Command {
                name: None,
                command,
            }],
            Raw::Named(map) => map
                .into_iter()
                .map(|(name, command)| Command {
                    name: Some(name),
                    command,
                })
                .collect(),
        };
        Ok(CommandConfig { commands })
    }
}

impl Serialize for CommandConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;

        if self.commands.len() == 1 && self.commands[0].name.is_none() {
            return self.commands[0].command.serialize(serializer);
        }

        let mut map = serializer.serialize_map(Some(self.commands.len()))?;
        for cmd in &self.commands {
            let key = cmd
                .name
                .as_deref()
                .expect("multi-command configs always carry names");
            map.serialize_entry(key, &cmd.command)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        hook: CommandConfig,
    }

    #[test]
    fn deserializes_single_string() {
        let w: Wrapper = serde_yaml::from_str("hook: npm install").unwrap();
        assert_eq!(w.hook.commands().len(), 1);
        assert_eq!(w.hook.commands()[0].name, None);
        assert_eq!(w.hook.commands()[0].command, "npm install");
    }

    #[test]
    fn deserializes_named_map_preserving_order() {
        let yaml = "hook:\n  first: echo 1\n  second: echo 2\n";
        let w: Wrapper = serde_yaml::from_str(yaml).unwrap();
        let cmds = w.hook.commands();
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].name.as_deref(), Some("first"));
        assert_eq!(cmds[1].name.as_deref(), Some("second"));
    }

    #[test]
    fn round_trips_single_command() {
        let config = CommandConfig {
            commands: vec![Command {
                name: None,
                command: "echo hi".to_string(),
            }],
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(yaml.trim(), "echo hi");
    }
}
