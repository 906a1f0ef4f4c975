//! /thinking and /search commands - show and set on/off switches

pub struct ToggleCommand;

impl ToggleCommand {
    /// Parse an on/off argument.
    ///
    /// Returns the new value, or a message to show when there is nothing to set.
    pub fn execute(name: &str, args: &str, current: bool) -> Result<bool, String> {
        if args.is_empty() {
            return Err(format!(
                "{} is {}\nSet with: /{} <on|off>",
                name,
                state_name(current),
                name
            ));
        }

        parse_switch(args).ok_or_else(|| {
            format!("Unknown value for {}: '{}'\nValid values: on, off", name, args)
        })
    }
}

fn parse_switch(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn state_name(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
