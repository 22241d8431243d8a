//! Stderr diagnostics. DuckDB gives loadable extensions no logging hook,
//! so verbosity comes from the `DUCKARROW_LOG_LEVEL` environment variable
//! (level name or number); anything at or below the current level is
//! written as one tagged line.

use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Debug = 3,
}

impl LogLevel {
    fn parse(s: &str) -> LogLevel {
        match s.trim().to_uppercase().as_str() {
            "ERROR" | "1" => LogLevel::Error,
            "WARN" | "WARNING" | "2" => LogLevel::Warn,
            // Trace maps onto debug; the extension has no finer level.
            "DEBUG" | "TRACE" | "3" | "4" | "5" => LogLevel::Debug,
            _ => LogLevel::Warn,
        }
    }

    fn current() -> LogLevel {
        env::var("DUCKARROW_LOG_LEVEL")
            .map(|s| LogLevel::parse(&s))
            .unwrap_or(LogLevel::Warn)
    }

    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Debug => "DEBUG",
        }
    }
}

pub fn emit(level: LogLevel, category: &str, message: &str) {
    if level > LogLevel::current() {
        return;
    }
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    eprintln!(
        "[{}.{:03}] [duckarrow] [{}] [{}] {}",
        elapsed.as_secs(),
        elapsed.subsec_millis(),
        level.as_str(),
        category,
        message
    );
}

macro_rules! log_error {
    ($category:expr, $($arg:tt)*) => {
        $crate::logging::emit($crate::logging::LogLevel::Error, $category, &format!($($arg)*))
    };
}

macro_rules! log_warn {
    ($category:expr, $($arg:tt)*) => {
        $crate::logging::emit($crate::logging::LogLevel::Warn, $category, &format!($($arg)*))
    };
}

macro_rules! log_debug {
    ($category:expr, $($arg:tt)*) => {
        $crate::logging::emit($crate::logging::LogLevel::Debug, $category, &format!($($arg)*))
    };
}

pub(crate) use {log_debug, log_error, log_warn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_numbers() {
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
        assert_eq!(LogLevel::parse("1"), LogLevel::Error);
        assert_eq!(LogLevel::parse("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::parse(" debug "), LogLevel::Debug);
        assert_eq!(LogLevel::parse("TRACE"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("5"), LogLevel::Debug);
    }

    #[test]
    fn test_parse_unknown_defaults_to_warn() {
        assert_eq!(LogLevel::parse("verbose"), LogLevel::Warn);
        assert_eq!(LogLevel::parse(""), LogLevel::Warn);
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Debug);
    }
}
