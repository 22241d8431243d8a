use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum DuckArrowError {
    InvalidArgument {
        message: String,
        parameter: Option<String>,
    },
    Connect {
        message: String,
        uri: Option<String>,
    },
    Statement {
        message: String,
        context: String,
    },
    Execute {
        message: String,
        query: Option<String>,
    },
    Remote {
        message: String,
        context: String,
    },
    Transport {
        message: String,
    },
    NotImplemented {
        operation: String,
    },
    NotFound {
        what: String,
        name: String,
    },
    Pool {
        message: String,
    },
}

impl fmt::Display for DuckArrowError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DuckArrowError::InvalidArgument { message, parameter } => {
                write!(f, "Invalid argument: {}", message)?;
                if let Some(param) = parameter {
                    write!(f, " (parameter: {})", param)?;
                }
                Ok(())
            }
            DuckArrowError::Connect { message, uri } => {
                write!(f, "Connection error: {}", message)?;
                if let Some(uri) = uri {
                    write!(f, " (URI: {})", uri)?;
                }
                Ok(())
            }
            DuckArrowError::Statement { message, context } => {
                write!(f, "Statement error: {} [{}]", message, context)
            }
            DuckArrowError::Execute { message, query } => {
                write!(f, "Execute error: {}", message)?;
                if let Some(query) = query {
                    let truncated = if query.len() > 100 {
                        format!("{}...", &query[..97])
                    } else {
                        query.clone()
                    };
                    write!(f, " (query: {})", truncated)?;
                }
                Ok(())
            }
            DuckArrowError::Remote { message, context } => {
                write!(f, "Remote error: {} [{}]", message, context)
            }
            DuckArrowError::Transport { message } => {
                write!(f, "Transport error: {}", message)
            }
            DuckArrowError::NotImplemented { operation } => {
                write!(f, "{} not supported: catalog is read-only", operation)
            }
            DuckArrowError::NotFound { what, name } => {
                write!(f, "{} \"{}\" not found", what, name)
            }
            DuckArrowError::Pool { message } => {
                write!(f, "Connection pool error: {}", message)
            }
        }
    }
}

impl Error for DuckArrowError {}

impl DuckArrowError {
    pub fn invalid_argument(message: &str) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::InvalidArgument {
            message: message.to_string(),
            parameter: None,
        })
    }

    pub fn invalid_parameter(message: &str, parameter: &str) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::InvalidArgument {
            message: message.to_string(),
            parameter: Some(parameter.to_string()),
        })
    }

    pub fn connect(message: &str, uri: Option<&str>) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::Connect {
            message: message.to_string(),
            uri: uri.map(|s| s.to_string()),
        })
    }

    pub fn statement(message: &str, context: &str) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::Statement {
            message: message.to_string(),
            context: context.to_string(),
        })
    }

    pub fn execute(message: &str, query: Option<&str>) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::Execute {
            message: message.to_string(),
            query: query.map(|s| s.to_string()),
        })
    }

    pub fn remote(message: &str, context: &str) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::Remote {
            message: message.to_string(),
            context: context.to_string(),
        })
    }

    pub fn transport(message: &str) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::Transport {
            message: message.to_string(),
        })
    }

    pub fn read_only(operation: &str) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::NotImplemented {
            operation: operation.to_string(),
        })
    }

    pub fn not_found(what: &str, name: &str) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::NotFound {
            what: what.to_string(),
            name: name.to_string(),
        })
    }

    pub fn pool(message: &str) -> Box<DuckArrowError> {
        Box::new(DuckArrowError::Pool {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = DuckArrowError::invalid_parameter("name too long", "table_name");
        let display = format!("{}", err);
        assert!(display.contains("name too long"));
        assert!(display.contains("table_name"));
    }

    #[test]
    fn test_read_only_display() {
        let err = DuckArrowError::read_only("CREATE TABLE");
        let display = format!("{}", err);
        assert!(display.contains("CREATE TABLE"));
        assert!(display.contains("read-only"));
    }

    #[test]
    fn test_execute_truncates_long_query() {
        let query = "X".repeat(500);
        let err = DuckArrowError::execute("remote failure", Some(&query));
        let display = format!("{}", err);
        assert!(display.contains("..."));
        assert!(display.len() < 250);
    }

    #[test]
    fn test_connect_with_uri() {
        let err = DuckArrowError::connect("refused", Some("grpc://h:1"));
        let display = format!("{}", err);
        assert!(display.contains("refused"));
        assert!(display.contains("grpc://h:1"));
    }
}
