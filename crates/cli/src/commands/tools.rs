use kommo_agent::ToolRegistry;
use serde::Serialize;

use super::{escape_json, CommandResult};

#[derive(Debug, Serialize)]
struct CatalogEntry {
    name: String,
    mutates: bool,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: serde_json::Value,
}

/// Prints the static catalog. Pipeline hints need an account and are left out.
pub fn run(json_output: bool) -> CommandResult {
    let registry = ToolRegistry::with_default_tools();
    let entries: Vec<CatalogEntry> = registry
        .definitions()
        .into_iter()
        .map(|definition| CatalogEntry {
            mutates: registry.mutates(&definition.name),
            name: definition.name,
            description: definition.description,
            input_schema: definition.input_schema,
        })
        .collect();

    if json_output {
        return match serde_json::to_string_pretty(&entries) {
            Ok(output) => CommandResult::ok(output),
            Err(error) => CommandResult::failed(
                1,
                format!("{{\"error\":\"catalog serialization failed: {}\"}}", escape_json(&error.to_string())),
            ),
        };
    }

    let mut lines = vec![format!("{} tools:", entries.len())];
    for entry in &entries {
        let marker = if entry.mutates { " [writes]" } else { "" };
        let summary = entry.description.lines().next().unwrap_or_default();
        lines.push(format!("- {}{marker}: {summary}", entry.name));
    }
    CommandResult::ok(lines.join("\n"))
}
