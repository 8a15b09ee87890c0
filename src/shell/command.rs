//! Shell Commands
//!
//! Parses one input line into a `Command`.

use serde_json::Value;

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

// == Command ==
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `set <key> <json> [ttl_ms]`
    Set {
        key: String,
        value: Value,
        ttl: Option<u64>,
    },
    Get { key: String },
    Has { key: String },
    Delete { key: String },
    /// `invalidate <regex>`
    Invalidate { pattern: String },
    /// `tags <t1,t2,...>`
    InvalidateTags { tags: Vec<String> },
    Cleanup,
    Stats,
    Health,
    Recommend,
    Clear,
    Quit,
}

impl Command {
    // == Parse ==
    /// Parses a command line. Command names are case-insensitive.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name.to_ascii_lowercase().as_str() {
            "" => Err(CacheError::InvalidRequest("Empty command".to_string())),
            "set" => parse_set(rest),
            "get" => Ok(Self::Get { key: single_key(rest)? }),
            "has" => Ok(Self::Has { key: single_key(rest)? }),
            "del" | "delete" => Ok(Self::Delete { key: single_key(rest)? }),
            "invalidate" => {
                if rest.is_empty() {
                    return Err(CacheError::InvalidRequest(
                        "Usage: invalidate <regex>".to_string(),
                    ));
                }
                Ok(Self::Invalidate {
                    pattern: rest.to_string(),
                })
            }
            "tags" => {
                let tags: Vec<String> = rest
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
                if tags.is_empty() {
                    return Err(CacheError::InvalidRequest(
                        "Usage: tags <t1,t2,...>".to_string(),
                    ));
                }
                Ok(Self::InvalidateTags { tags })
            }
            "cleanup" => no_args(rest, Self::Cleanup),
            "stats" => no_args(rest, Self::Stats),
            "health" => no_args(rest, Self::Health),
            "recommend" => no_args(rest, Self::Recommend),
            "clear" => no_args(rest, Self::Clear),
            "quit" | "exit" => no_args(rest, Self::Quit),
            other => Err(CacheError::InvalidRequest(format!(
                "Unknown command '{}'",
                other
            ))),
        }
    }
}

/// Validates a cache key: non-empty and at most `MAX_KEY_LENGTH` bytes.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

fn single_key(rest: &str) -> Result<String> {
    if rest.split_whitespace().count() > 1 {
        return Err(CacheError::InvalidRequest(
            "Keys cannot contain whitespace".to_string(),
        ));
    }
    validate_key(rest)?;
    Ok(rest.to_string())
}

fn no_args(rest: &str, command: Command) -> Result<Command> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(CacheError::InvalidRequest(format!(
            "Unexpected arguments: {}",
            rest
        )))
    }
}

/// `<key> <json> [ttl_ms]`. A trailing integer is a TTL only when the text
/// before it is itself valid JSON.
fn parse_set(rest: &str) -> Result<Command> {
    let Some((key, payload)) = rest.split_once(char::is_whitespace) else {
        return Err(CacheError::InvalidRequest(
            "Usage: set <key> <json> [ttl_ms]".to_string(),
        ));
    };
    validate_key(key)?;
    let payload = payload.trim();

    if let Some((value, ttl)) = payload.rsplit_once(char::is_whitespace) {
        if let (Ok(ttl), Ok(value)) = (ttl.parse::<u64>(), serde_json::from_str(value.trim())) {
            return Ok(Command::Set {
                key: key.to_string(),
                value,
                ttl: Some(ttl),
            });
        }
    }

    Ok(Command::Set {
        key: key.to_string(),
        value: serde_json::from_str(payload)?,
        ttl: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_set_with_json_and_ttl() {
        let cmd = Command::parse(r#"set user:1 {"name": "Ada", "age": 36} 5000"#).unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                key: "user:1".to_string(),
                value: json!({"name": "Ada", "age": 36}),
                ttl: Some(5000),
            }
        );
    }

    #[test]
    fn test_parse_set_without_ttl() {
        let cmd = Command::parse("SET n 42").unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                key: "n".to_string(),
                value: json!(42),
                ttl: None,
            }
        );

        let cmd = Command::parse("set list [1, 2]").unwrap();
        assert!(matches!(cmd, Command::Set { ttl: None, .. }));
    }

    #[test]
    fn test_parse_set_rejects_bad_json() {
        let err = Command::parse("set k {not json}").unwrap_err();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert!(Command::parse("set k").is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("ok").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH)).is_ok());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_parse_key_commands() {
        assert_eq!(
            Command::parse("get a").unwrap(),
            Command::Get { key: "a".to_string() }
        );
        assert_eq!(
            Command::parse("del a").unwrap(),
            Command::Delete { key: "a".to_string() }
        );
        assert!(Command::parse("get").is_err());
        assert!(Command::parse("has a b").is_err());
    }

    #[test]
    fn test_parse_invalidation_commands() {
        assert_eq!(
            Command::parse("invalidate ^user:.*").unwrap(),
            Command::Invalidate {
                pattern: "^user:.*".to_string()
            }
        );
        assert_eq!(
            Command::parse("tags users, feed").unwrap(),
            Command::InvalidateTags {
                tags: vec!["users".to_string(), "feed".to_string()]
            }
        );
        assert!(Command::parse("tags ,").is_err());
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(Command::parse("stats").unwrap(), Command::Stats);
        assert_eq!(Command::parse("  QUIT ").unwrap(), Command::Quit);
        assert!(Command::parse("stats now").is_err());
        assert!(Command::parse("flushall").is_err());
        assert!(Command::parse("").is_err());
    }
}
