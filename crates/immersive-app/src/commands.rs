use immersive_lifecycle::CatalogKind;
use immersive_protocol::SourceId;

use crate::error::{AppError, AppResult};

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Select {
        catalog: CatalogKind,
        source: SourceId,
    },
    Clear(CatalogKind),
    Go,
    End,
    Status,
    Catalogs,
    Quit,
}

/// Returns `None` for blank lines and `#` comments.
pub fn parse_command(line: &str) -> AppResult<Option<PlayerCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "general" => PlayerCommand::Select {
            catalog: CatalogKind::General,
            source: required_argument(verb, rest)?.into(),
        },
        "special" => PlayerCommand::Select {
            catalog: CatalogKind::Special,
            source: required_argument(verb, rest)?.into(),
        },
        "clear" => PlayerCommand::Clear(parse_catalog_kind(rest)?),
        "go" => no_argument(verb, rest, PlayerCommand::Go)?,
        "end" => no_argument(verb, rest, PlayerCommand::End)?,
        "status" => no_argument(verb, rest, PlayerCommand::Status)?,
        "catalogs" => no_argument(verb, rest, PlayerCommand::Catalogs)?,
        "quit" | "exit" => no_argument(verb, rest, PlayerCommand::Quit)?,
        other => {
            return Err(AppError::command(format!(
                "unknown command '{other}'; expected general, special, clear, go, end, status, catalogs or quit"
            )));
        }
    };
    Ok(Some(command))
}

fn required_argument<'a>(verb: &str, rest: &'a str) -> AppResult<&'a str> {
    if rest.is_empty() {
        return Err(AppError::command(format!("'{verb}' requires a source id")));
    }
    Ok(rest)
}

fn no_argument(verb: &str, rest: &str, command: PlayerCommand) -> AppResult<PlayerCommand> {
    if !rest.is_empty() {
        return Err(AppError::command(format!("'{verb}' takes no arguments")));
    }
    Ok(command)
}

fn parse_catalog_kind(value: &str) -> AppResult<CatalogKind> {
    match value.to_ascii_lowercase().as_str() {
        "general" => Ok(CatalogKind::General),
        "special" => Ok(CatalogKind::Special),
        _ => Err(AppError::command(
            "'clear' expects 'general' or 'special'",
        )),
    }
}
