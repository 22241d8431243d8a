//! Table-name rewriting for the reserved virtual schema.
//!
//! When the host resolver fails to find a table owned by the `duckarrow`
//! schema, the reference is rewritten into a `remote_query` invocation
//! against the current global URI. The rewriter declines (returns `None`)
//! when no URI is configured or the name matches the skip filter, letting
//! the reference fall through to the host's normal not-found path.

use std::error::Error;

use crate::config::{get_global_config, ConnectionConfig};
use crate::query::build_select_all;
use crate::validate::{is_skipped_table, validate_table_name};

pub const VIRTUAL_SCHEMA: &str = "duckarrow";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementScan {
    pub function: String,
    pub arguments: Vec<String>,
}

pub fn applies_to_schema(schema: &str) -> bool {
    schema.eq_ignore_ascii_case(VIRTUAL_SCHEMA)
}

/// Strips exactly one surrounding pair of double quotes, never more.
fn strip_one_quote_pair(name: &str) -> &str {
    if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        &name[1..name.len() - 1]
    } else {
        name
    }
}

pub fn rewrite_table_reference(table_ref: &str) -> Result<Option<ReplacementScan>, Box<dyn Error>> {
    let config = get_global_config();
    rewrite_with_config(table_ref, config.as_deref())
}

pub fn rewrite_with_config(
    table_ref: &str,
    config: Option<&ConnectionConfig>,
) -> Result<Option<ReplacementScan>, Box<dyn Error>> {
    let name = strip_one_quote_pair(table_ref);
    validate_table_name(name)?;
    if is_skipped_table(name) {
        return Ok(None);
    }
    let config = match config {
        Some(config) if !config.uri.is_empty() => config,
        _ => return Ok(None),
    };
    Ok(Some(ReplacementScan {
        function: "remote_query".to_string(),
        arguments: vec![config.uri.clone(), build_select_all(name)],
    }))
}
