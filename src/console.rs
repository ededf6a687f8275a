// Operator command parsing and dispatch.
//
// Translates lines read from stdin into Command messages handled by the
// main loop. The grammar is deliberately small: one command per line,
// whitespace-separated, with the note text taken verbatim to the end of
// the line.

use crate::workflow::NavRequest;

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Move to the next/previous roster entry or jump to a 1-based index.
    Nav(NavRequest),
    /// Set a metric's draft value (`set <metric> <value>`; omit the value to
    /// clear).
    Set { metric: String, value: String },
    /// Set a metric's draft note (`note <metric> <text...>`).
    Note { metric: String, text: String },
    /// Save the active player's drafts now.
    Save,
    /// Print the active player's form and session progress.
    Status,
    /// Close out the session.
    Finish,
    Help,
    Quit,
}

/// Parse one input line. Empty lines are `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let mut parts = line.splitn(2, char::is_whitespace);
    let word = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    let command = match word {
        "next" | "n" => require_empty(rest, Command::Nav(NavRequest::Next))?,
        "prev" | "previous" | "p" => require_empty(rest, Command::Nav(NavRequest::Previous))?,
        "goto" | "g" => {
            let index: usize = rest
                .parse()
                .map_err(|_| format!("usage: goto <player number>, got `{rest}`"))?;
            if index == 0 {
                return Err("player numbers start at 1".to_string());
            }
            Command::Nav(NavRequest::GoTo(index - 1))
        }
        "set" | "s" => {
            let mut args = rest.splitn(2, char::is_whitespace);
            let metric = args.next().unwrap_or_default();
            if metric.is_empty() {
                return Err("usage: set <metric> [value]".to_string());
            }
            Command::Set {
                metric: metric.to_string(),
                value: args.next().unwrap_or("").trim().to_string(),
            }
        }
        "note" => {
            let mut args = rest.splitn(2, char::is_whitespace);
            let metric = args.next().unwrap_or_default();
            if metric.is_empty() {
                return Err("usage: note <metric> [text]".to_string());
            }
            Command::Note {
                metric: metric.to_string(),
                text: args.next().unwrap_or("").trim().to_string(),
            }
        }
        "save" => require_empty(rest, Command::Save)?,
        "status" | "st" => require_empty(rest, Command::Status)?,
        "finish" => require_empty(rest, Command::Finish)?,
        "help" | "h" | "?" => require_empty(rest, Command::Help)?,
        "quit" | "q" | "exit" => require_empty(rest, Command::Quit)?,
        other => return Err(format!("unknown command `{other}` (try `help`)")),
    };

    Ok(Some(command))
}

fn require_empty(rest: &str, command: Command) -> Result<Command, String> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(format!("unexpected argument `{rest}`"))
    }
}

pub const HELP_TEXT: &str = "\
commands:
  next | prev          move between players (saves changes first)
  goto <n>             jump to player n (1-based)
  set <metric> [value] set a metric value; omit the value to clear it
  note <metric> [text] attach a note to a metric
  save                 save the active player's metrics now
  status               show the active form and session progress
  finish               complete the session (all players must have records)
  quit                 exit";

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_navigation() {
        assert_eq!(parse("next").unwrap(), Some(Command::Nav(NavRequest::Next)));
        assert_eq!(parse("p").unwrap(), Some(Command::Nav(NavRequest::Previous)));
        assert_eq!(
            parse("goto 3").unwrap(),
            Some(Command::Nav(NavRequest::GoTo(2)))
        );
    }

    #[test]
    fn goto_rejects_zero_and_garbage() {
        assert!(parse("goto 0").is_err());
        assert!(parse("goto abc").is_err());
        assert!(parse("goto").is_err());
    }

    #[test]
    fn parses_set_with_and_without_value() {
        assert_eq!(
            parse("set vjump 42.5").unwrap(),
            Some(Command::Set {
                metric: "vjump".to_string(),
                value: "42.5".to_string(),
            })
        );
        // Clearing a value
        assert_eq!(
            parse("set vjump").unwrap(),
            Some(Command::Set {
                metric: "vjump".to_string(),
                value: String::new(),
            })
        );
        assert!(parse("set").is_err());
    }

    #[test]
    fn note_text_is_taken_verbatim() {
        assert_eq!(
            parse("note vjump felt strong today").unwrap(),
            Some(Command::Note {
                metric: "vjump".to_string(),
                text: "felt strong today".to_string(),
            })
        );
    }

    #[test]
    fn empty_lines_are_skipped() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn rejects_unknown_and_trailing_arguments() {
        assert!(parse("frobnicate").is_err());
        assert!(parse("save now").is_err());
        assert!(parse("next next").is_err());
    }
}
