use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How to launch the tool-providing backend process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpServerConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    /// Parse a full shell-style command line, e.g. `"bun run server/index.ts"`.
    pub fn from_command_line(line: &str) -> Result<Self, String> {
        let mut parts =
            shlex::split(line).ok_or_else(|| format!("failed to parse backend command: {line}"))?;

        if parts.is_empty() {
            return Err("backend command is empty".to_string());
        }

        let command = parts.remove(0);
        Ok(Self {
            command,
            args: parts,
            env: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_line() {
        let cfg = McpServerConfig::from_command_line("bun run ../server/index.ts").unwrap();
        assert_eq!(cfg.command, "bun");
        assert_eq!(
            cfg.args,
            vec!["run".to_string(), "../server/index.ts".to_string()]
        );
    }

    #[test]
    fn parses_quoted_arguments() {
        let cfg = McpServerConfig::from_command_line("node \"my server.js\"").unwrap();
        assert_eq!(cfg.command, "node");
        assert_eq!(cfg.args, vec!["my server.js".to_string()]);
    }

    #[test]
    fn rejects_empty_command_line() {
        assert!(McpServerConfig::from_command_line("").is_err());
        assert!(McpServerConfig::from_command_line("   ").is_err());
    }
}
