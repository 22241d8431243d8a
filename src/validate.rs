use crate::error::DuckArrowError;
use std::error::Error;

pub const MAX_TABLE_NAME_LEN: usize = 255;
pub const MAX_URI_LEN: usize = 2048;

const FORBIDDEN_SEQUENCES: &[&str] = &[";", "--", "/*", "*/", "\0", "\r", "\n", "\t"];

// Tables the rewriter must never route to the remote: host internals,
// information_schema probes, and partner-tool cache tables.
const SKIP_PREFIXES: &[&str] = &["pg_", "sqlite_", "information_schema", "__", "mdclientcache_"];

pub fn validate_table_name(name: &str) -> Result<(), Box<dyn Error>> {
    if name.is_empty() {
        return Err(DuckArrowError::invalid_parameter(
            "table name cannot be empty",
            "table_name",
        ));
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(DuckArrowError::invalid_parameter(
            "table name too long (max 255 characters)",
            "table_name",
        ));
    }
    for seq in FORBIDDEN_SEQUENCES {
        if name.contains(seq) {
            return Err(DuckArrowError::invalid_parameter(
                "table name contains invalid characters",
                "table_name",
            ));
        }
    }
    Ok(())
}

pub fn validate_uri(uri: &str) -> Result<(), Box<dyn Error>> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(DuckArrowError::invalid_parameter(
            "URI cannot be empty",
            "uri",
        ));
    }
    if trimmed.len() > MAX_URI_LEN {
        return Err(DuckArrowError::invalid_parameter(
            "URI too long (max 2048 characters)",
            "uri",
        ));
    }
    let rest = if let Some(rest) = trimmed.strip_prefix("grpc+tls://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("grpc://") {
        rest
    } else {
        return Err(DuckArrowError::invalid_parameter(
            "URI must start with grpc:// or grpc+tls://",
            "uri",
        ));
    };
    if rest.is_empty() {
        return Err(DuckArrowError::invalid_parameter(
            "URI is missing a host",
            "uri",
        ));
    }
    let authority = rest.split('/').next().unwrap_or("");
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = match host.strip_prefix('[') {
        // Bracketed IPv6 literal
        Some(v6) => v6.split(']').next().unwrap_or(""),
        None => host.split(':').next().unwrap_or(""),
    };
    if host.is_empty() {
        return Err(DuckArrowError::invalid_parameter(
            "URI is missing a host",
            "uri",
        ));
    }
    Ok(())
}

/// Whether the URI requests TLS. Callers validate first.
pub fn uri_is_tls(uri: &str) -> bool {
    uri.trim().starts_with("grpc+tls://")
}

pub fn is_skipped_table(name: &str) -> bool {
    let lowered = name.to_lowercase();
    SKIP_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_valid() {
        assert!(validate_table_name("Order").is_ok());
        assert!(validate_table_name("My\"Table").is_ok());
        assert!(validate_table_name("with space").is_ok());
        assert!(validate_table_name("unicode_タブ").is_ok());
        assert!(validate_table_name("back\\slash").is_ok());
    }

    #[test]
    fn test_table_name_empty() {
        let result = validate_table_name("");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_table_name_length_boundary() {
        let exactly = "a".repeat(255);
        assert!(validate_table_name(&exactly).is_ok());
        let over = "a".repeat(256);
        let result = validate_table_name(&over);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_table_name_injection_rejected() {
        for name in [
            "Order;DROP TABLE users",
            "t--comment",
            "t/*c*/",
            "t*/x",
            "nul\0byte",
            "line\nbreak",
            "carriage\rreturn",
            "tab\tchar",
        ] {
            let result = validate_table_name(name);
            assert!(result.is_err(), "expected rejection for {:?}", name);
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("contains invalid characters"));
        }
    }

    #[test]
    fn test_uri_valid() {
        assert!(validate_uri("grpc://localhost:31337").is_ok());
        assert!(validate_uri("grpc+tls://h:31337").is_ok());
        assert!(validate_uri("  grpc://host  ").is_ok());
        assert!(validate_uri("grpc://user@host:1234").is_ok());
        assert!(validate_uri("grpc+tls://[::1]:50051").is_ok());
    }

    #[test]
    fn test_uri_scheme_rejected() {
        for uri in ["http://x", "grpcs://x", "grpc:/x", "localhost:50051"] {
            let result = validate_uri(uri);
            assert!(result.is_err(), "expected rejection for {:?}", uri);
            assert!(result
                .unwrap_err()
                .to_string()
                .contains("URI must start with grpc:// or grpc+tls://"));
        }
    }

    #[test]
    fn test_uri_empty_and_missing_host() {
        assert!(validate_uri("").is_err());
        assert!(validate_uri("   ").is_err());
        assert!(validate_uri("grpc://").is_err());
        assert!(validate_uri("grpc+tls://").is_err());
        assert!(validate_uri("grpc://user@:1234").is_err());
    }

    #[test]
    fn test_uri_length_boundary() {
        let host = "h".repeat(2048 - "grpc://".len());
        let exactly = format!("grpc://{}", host);
        assert_eq!(exactly.len(), 2048);
        assert!(validate_uri(&exactly).is_ok());
        let over = format!("grpc://{}h", host);
        assert_eq!(over.len(), 2049);
        assert!(validate_uri(&over).is_err());
    }

    #[test]
    fn test_uri_tls_detection() {
        assert!(uri_is_tls("grpc+tls://h:1"));
        assert!(!uri_is_tls("grpc://h:1"));
    }

    #[test]
    fn test_skip_tables() {
        assert!(is_skipped_table("pg_catalog"));
        assert!(is_skipped_table("PG_TABLES"));
        assert!(is_skipped_table("sqlite_master"));
        assert!(is_skipped_table("information_schema"));
        assert!(is_skipped_table("__internal"));
        assert!(is_skipped_table("MDClientCache_v1"));
        assert!(!is_skipped_table("orders"));
        assert!(!is_skipped_table("my_pg_data"));
    }
}
