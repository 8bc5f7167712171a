//! Command grammar
//!
//! ```text
//! delete predictor <name> [force]
//! delete datasource <name>
//! ```
//!
//! Verbs and nouns are case-insensitive, names are not. A name may be
//! wrapped in single quotes, double quotes or backticks.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed imperative command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    DeletePredictor { name: String, force: bool },
    DeleteDatasource { name: String },
}

impl Command {
    pub fn parse(text: &str) -> Result<Self> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let Some((verb, args)) = words.split_first() else {
            return Err(Error::malformed(text, "empty command"));
        };

        if !verb.eq_ignore_ascii_case("delete") {
            return Err(Error::malformed(text, format!("unknown verb '{}'", verb)));
        }

        match args {
            [noun, name, rest @ ..] if noun.eq_ignore_ascii_case("predictor") => {
                let force = match rest {
                    [] => false,
                    [flag] if flag.eq_ignore_ascii_case("force") => true,
                    _ => return Err(Error::malformed(text, "unexpected trailing arguments")),
                };
                Ok(Command::DeletePredictor {
                    name: unquote(text, name)?,
                    force,
                })
            }
            [noun, name] if noun.eq_ignore_ascii_case("datasource") => {
                Ok(Command::DeleteDatasource {
                    name: unquote(text, name)?,
                })
            }
            [noun, ..] if noun.eq_ignore_ascii_case("datasource") => Err(Error::malformed(
                text,
                "expected 'delete datasource <name>'",
            )),
            [noun, ..] if !noun.eq_ignore_ascii_case("predictor") => Err(Error::malformed(
                text,
                format!("cannot delete '{}'", noun),
            )),
            _ => Err(Error::malformed(text, "expected 'delete predictor <name>'")),
        }
    }

    /// Name of the object the command acts on
    pub fn target(&self) -> &str {
        match self {
            Command::DeletePredictor { name, .. } | Command::DeleteDatasource { name } => name,
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Command::parse(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::DeletePredictor { name, force: false } => {
                write!(f, "delete predictor {}", name)
            }
            Command::DeletePredictor { name, force: true } => {
                write!(f, "delete predictor {} force", name)
            }
            Command::DeleteDatasource { name } => write!(f, "delete datasource {}", name),
        }
    }
}

fn unquote(text: &str, raw: &str) -> Result<String> {
    let name = ['\'', '"', '`']
        .iter()
        .find_map(|q| raw.strip_prefix(*q).and_then(|r| r.strip_suffix(*q)))
        .unwrap_or(raw);
    if name.is_empty() || name.starts_with(['\'', '"', '`']) || name.ends_with(['\'', '"', '`'])
    {
        return Err(Error::malformed(text, format!("invalid name {}", raw)));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_predictor() {
        assert_eq!(
            Command::parse("delete predictor cars_predictor").unwrap(),
            Command::DeletePredictor {
                name: "cars_predictor".into(),
                force: false
            }
        );
        assert_eq!(
            "DELETE Predictor `Cars` FORCE".parse::<Command>().unwrap(),
            Command::DeletePredictor {
                name: "Cars".into(),
                force: true
            }
        );
    }

    #[test]
    fn test_delete_datasource() {
        let command = Command::parse("  delete   datasource 'cars_file' ").unwrap();
        assert_eq!(command.target(), "cars_file");
        assert_eq!(command.to_string(), "delete datasource cars_file");
    }

    #[test]
    fn test_malformed_commands() {
        for text in [
            "",
            "   ",
            "drop predictor x",
            "delete",
            "delete predictor",
            "delete predictor x now",
            "delete model x",
            "delete datasource a b",
            "delete predictor ''",
        ] {
            let err = Command::parse(text).unwrap_err();
            assert_eq!(err.code(), "malformed_command", "{:?}", text);
        }
    }
}
