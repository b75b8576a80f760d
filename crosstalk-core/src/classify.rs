//! Command-line classification
//!
//! The single place where a string becomes an [`AgentVariant`]. Everywhere
//! else the variant flows as a value.

use crate::types::AgentVariant;

/// Commands that host many CLIs under one binary name. A pane reporting
/// one of these needs the child-process walk before it can be classified.
const GENERIC_INTERPRETERS: &[&str] = &["node", "bun", "deno", "python", "python3"];

/// Map a command line to an agent variant.
///
/// Rules are evaluated in order and the first match wins; matching is a
/// case-insensitive substring check. Order matters: `opencode` and `coder`
/// both contain `code`, so rule 3 excludes `opencode` explicitly to keep
/// the two disjoint.
pub fn classify(command_line: &str) -> AgentVariant {
    let command = command_line.to_lowercase();

    if command.contains("claude") {
        return AgentVariant::Claude;
    }
    if command.contains("opencode") || command.contains("open-code") {
        return AgentVariant::Opencode;
    }
    if command.contains("coder") && !command.contains("opencode") {
        return AgentVariant::Coder;
    }
    if command.contains("crush") {
        return AgentVariant::Crush;
    }

    AgentVariant::Unknown
}

/// True when the reported pane command is a generic interpreter whose real
/// program must be found among its children.
pub fn is_generic_interpreter(command: &str) -> bool {
    GENERIC_INTERPRETERS.contains(&command.trim())
}
