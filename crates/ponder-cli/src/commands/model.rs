//! /model command - list and switch models

use super::CommandResult;

pub struct ModelCommand;

impl ModelCommand {
    /// Execute /model command - lists models if no args, or switches to a matching model
    pub fn execute(args: &str) -> CommandResult {
        if args.is_empty() {
            CommandResult::ListModels
        } else {
            CommandResult::ChangeModel(args.to_string())
        }
    }

    /// List models as text, marking the current one and reasoning models
    pub fn list_models_text(current: &str, models: &[String], thinking: &[String]) -> String {
        if models.is_empty() {
            return "No models available".to_string();
        }

        let mut output = String::from("Available models:\n");
        for model in models {
            let reasoning = if thinking.contains(model) {
                " (thinking)"
            } else {
                ""
            };
            let marker = if model == current { " *" } else { "" };
            output.push_str(&format!("  {}{}{}\n", model, reasoning, marker));
        }

        output.push_str("\nSwitch with: /model <name>");
        output
    }

    /// Find a model by exact id, then by substring
    pub fn find_model(query: &str, models: &[String]) -> Option<String> {
        let query_lower = query.to_lowercase();

        if let Some(model) = models.iter().find(|m| m.to_lowercase() == query_lower) {
            return Some(model.clone());
        }

        models
            .iter()
            .find(|m| m.to_lowercase().contains(&query_lower))
            .cloned()
    }
}
