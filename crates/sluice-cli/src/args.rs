//! `-key value` argument ingestion.

use std::path::PathBuf;
use std::str::FromStr;

use sluice_types::SluiceError;

/// Default log file for `-logType file`.
pub const DEFAULT_LOG_FILE: &str = "sluice.log";

/// Keys consumed by the runner itself; every other key becomes an environment
/// override.
pub const RESERVED_KEYS: [&str; 5] = ["pipeline", "logType", "logFile", "verbose", "validate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogType {
    #[default]
    Console,
    File,
}

impl FromStr for LogType {
    type Err = SluiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(LogType::Console),
            "file" => Ok(LogType::File),
            other => Err(SluiceError::ValidationError(format!(
                "unknown log type '{other}' (expected console or file)"
            ))),
        }
    }
}

/// Everything the command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub pipeline: Option<PathBuf>,
    pub log_type: LogType,
    pub log_file: PathBuf,
    pub verbose: bool,
    pub validate: bool,
    pub overrides: Vec<(String, String)>,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            pipeline: None,
            log_type: LogType::Console,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            verbose: false,
            validate: false,
            overrides: Vec::new(),
        }
    }
}

/// Split raw arguments into `(key, value)` pairs. A key is a token starting
/// with `-` (or `--`); the following token is its value unless it is itself a
/// key, in which case the flag means `"true"`. Negative numbers count as
/// values.
pub fn parse_pairs(args: &[String]) -> Result<Vec<(String, String)>, SluiceError> {
    let mut pairs = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(token) = iter.next() {
        let Some(key) = key_of(token) else {
            return Err(SluiceError::ValidationError(format!(
                "unexpected argument '{token}' (expected -key value)"
            )));
        };
        let value = match iter.peek() {
            Some(next) if key_of(next).is_none() => iter.next().cloned().unwrap_or_default(),
            _ => "true".to_string(),
        };
        pairs.push((key.to_string(), value));
    }
    Ok(pairs)
}

fn key_of(token: &str) -> Option<&str> {
    if token.parse::<f64>().is_ok() {
        return None;
    }
    let key = token.strip_prefix("--").or_else(|| token.strip_prefix('-'))?;
    (!key.is_empty()).then_some(key)
}

fn is_true(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}

/// Build an [`Invocation`] from the raw arguments. Reserved keys match
/// case-insensitively; later occurrences win.
pub fn parse_invocation(args: &[String]) -> Result<Invocation, SluiceError> {
    let mut invocation = Invocation::default();

    for (key, value) in parse_pairs(args)? {
        let reserved = RESERVED_KEYS.iter().find(|r| r.eq_ignore_ascii_case(&key));
        match reserved.copied() {
            Some("pipeline") => invocation.pipeline = Some(PathBuf::from(value)),
            Some("logType") => invocation.log_type = value.parse()?,
            Some("logFile") => invocation.log_file = PathBuf::from(value),
            Some("verbose") => invocation.verbose = is_true(&value),
            Some("validate") => invocation.validate = is_true(&value),
            _ => invocation.overrides.push((key, value)),
        }
    }
    Ok(invocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pairs_and_bare_flags() {
        let pairs = parse_pairs(&args(&["-Inbox", "/data/in", "-dryRun", "-Limit", "-3"])).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("Inbox".to_string(), "/data/in".to_string()),
                ("dryRun".to_string(), "true".to_string()),
                ("Limit".to_string(), "-3".to_string()),
            ]
        );
    }

    #[test]
    fn trailing_flag_is_true() {
        let pairs = parse_pairs(&args(&["--verbose"])).unwrap();
        assert_eq!(pairs, vec![("verbose".to_string(), "true".to_string())]);
    }

    #[test]
    fn stray_value_is_rejected() {
        let err = parse_pairs(&args(&["orphan"])).unwrap_err();
        assert!(err.to_string().contains("orphan"));
    }

    #[test]
    fn reserved_keys_are_consumed() {
        let invocation = parse_invocation(&args(&[
            "-pipeline",
            "backup.json",
            "-LOGTYPE",
            "file",
            "-logFile",
            "run.log",
            "-verbose",
            "-validate",
            "false",
            "-Target",
            "out",
        ]))
        .unwrap();

        assert_eq!(invocation.pipeline, Some(PathBuf::from("backup.json")));
        assert_eq!(invocation.log_type, LogType::File);
        assert_eq!(invocation.log_file, PathBuf::from("run.log"));
        assert!(invocation.verbose);
        assert!(!invocation.validate);
        assert_eq!(invocation.overrides, vec![("Target".to_string(), "out".to_string())]);
    }

    #[test]
    fn defaults_without_arguments() {
        let invocation = parse_invocation(&[]).unwrap();
        assert_eq!(invocation, Invocation::default());
        assert_eq!(invocation.log_file, PathBuf::from(DEFAULT_LOG_FILE));
    }

    #[test]
    fn unknown_log_type_fails() {
        let err = parse_invocation(&args(&["-logType", "syslog"])).unwrap_err();
        assert_eq!(err.result_code(), sluice_types::codes::INVALID);
    }
}
