use anyhow::{anyhow, Result};
use neonops_core::{LlmProviderKind, ToolId};

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Submit(String),
    SwitchTool(ToolId),
    SwitchProvider(LlmProviderKind),
    History,
    Clear,
    Tools,
    Help,
    Quit,
}

pub const HELP: &str = "\
/tool <id>          switch tool
/provider <id>      switch provider (claude, deepseek, openai, mock)
/history            show this tool's conversation
/clear              clear this tool's conversation
/tools              list tools
/quit               exit
Ctrl-C while a reply streams cancels it; at the prompt it exits.";

pub fn parse_line(line: &str) -> Result<ReplCommand> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Ok(ReplCommand::Submit(line.trim_end_matches(&['\r', '\n'][..]).to_string()));
    };
    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };
    match name {
        "tool" => {
            if argument.is_empty() {
                return Err(anyhow!("usage: /tool <id>"));
            }
            Ok(ReplCommand::SwitchTool(argument.parse()?))
        }
        "provider" => {
            if argument.is_empty() {
                return Err(anyhow!("usage: /provider <id>"));
            }
            Ok(ReplCommand::SwitchProvider(argument.parse()?))
        }
        "history" => Ok(ReplCommand::History),
        "clear" => Ok(ReplCommand::Clear),
        "tools" => Ok(ReplCommand::Tools),
        "help" | "?" => Ok(ReplCommand::Help),
        "quit" | "exit" | "q" => Ok(ReplCommand::Quit),
        other => Err(anyhow!("unknown command /{other}, try /help")),
    }
}
