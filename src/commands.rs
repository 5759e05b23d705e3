use std::collections::HashMap;
use tracing::debug;

use crate::config::CommandConfig;

const HELP_HEADER: &str = "請輸入以下指令查詢附近地點：";

/// One user-facing command and the search keyword it stands for
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub command: String,
    pub keyword: String,
    /// Shown next to the command in the help text
    pub icon: String,
}

/// Outcome of routing one message
#[derive(Debug, Clone, PartialEq)]
pub enum Route<'a> {
    /// Run a nearby search for this keyword
    Search(&'a Command),
    /// Unknown input; reply with the help text
    Help(&'a str),
}

/// Fixed command vocabulary, read-only once built
#[derive(Debug, Clone)]
pub struct CommandTable {
    /// Kept in configuration order for the help text
    commands: Vec<Command>,
    index: HashMap<String, usize>,
    help: String,
}

impl CommandTable {
    pub fn new(entries: &[CommandConfig]) -> Self {
        let mut commands: Vec<Command> = Vec::with_capacity(entries.len());
        let mut index = HashMap::new();

        for entry in entries {
            let command = Command {
                command: entry.command.trim().to_string(),
                keyword: entry.keyword.clone(),
                icon: entry.icon.clone(),
            };
            // Later duplicates replace the earlier keyword but keep its position
            if let Some(&pos) = index.get(&command.command) {
                commands[pos] = command;
            } else {
                index.insert(command.command.clone(), commands.len());
                commands.push(command);
            }
        }

        let help = build_help(&commands);
        Self {
            commands,
            index,
            help,
        }
    }

    /// Exact match on the trimmed text. No case folding, no prefixes.
    pub fn route(&self, text: &str) -> Route<'_> {
        match self.index.get(text.trim()) {
            Some(&pos) => {
                let command = &self.commands[pos];
                debug!("Routed {} -> {}", command.command, command.keyword);
                Route::Search(command)
            }
            None => Route::Help(&self.help),
        }
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }

    pub fn list(&self) -> &[Command] {
        &self.commands
    }
}

fn build_help(commands: &[Command]) -> String {
    let mut help = String::from(HELP_HEADER);
    for command in commands {
        help.push('\n');
        help.push_str(&command.command);
        if !command.icon.is_empty() {
            help.push(' ');
            help.push_str(&command.icon);
        }
    }
    help
}
