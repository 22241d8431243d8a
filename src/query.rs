//! Remote SQL assembly. Identifiers are always quoted; embedded quotes are
//! doubled. User input never reaches the remote unescaped.

pub fn escape_identifier(ident: &str) -> String {
    ident.replace('"', "\"\"")
}

fn quoted_table(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(schema) if !schema.is_empty() => {
            format!(
                "\"{}\".\"{}\"",
                escape_identifier(schema),
                escape_identifier(table)
            )
        }
        _ => format!("\"{}\"", escape_identifier(table)),
    }
}

/// `WHERE 1=0` keeps the statement metadata-only on every remote.
pub fn build_schema_probe(schema: Option<&str>, table: &str) -> String {
    format!("SELECT * FROM {} WHERE 1=0", quoted_table(schema, table))
}

/// Projection is a list of indices into `columns`. An empty projection or
/// one that equals the full column set in order emits `*`; a permuted full
/// set emits the explicit list so the remote preserves the requested order.
pub fn build_projected_query(
    schema: Option<&str>,
    table: &str,
    columns: &[String],
    projection: &[usize],
) -> String {
    let full_in_order = projection.len() == columns.len()
        && projection.iter().enumerate().all(|(pos, &idx)| pos == idx);
    let select_list = if projection.is_empty() || full_in_order {
        "*".to_string()
    } else {
        projection
            .iter()
            .filter_map(|&idx| columns.get(idx))
            .map(|name| format!("\"{}\"", escape_identifier(name)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("SELECT {} FROM {}", select_list, quoted_table(schema, table))
}

/// The rewriter's synthesized query for a bare virtual-schema reference.
pub fn build_select_all(table: &str) -> String {
    format!("SELECT * FROM \"{}\"", escape_identifier(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_schema_probe() {
        assert_eq!(
            build_schema_probe(Some("s"), "t"),
            "SELECT * FROM \"s\".\"t\" WHERE 1=0"
        );
        assert_eq!(
            build_schema_probe(None, "t"),
            "SELECT * FROM \"t\" WHERE 1=0"
        );
    }

    #[test]
    fn test_projection_subset() {
        let sql = build_projected_query(None, "Order", &cols(&["id", "name", "status"]), &[0, 2]);
        assert_eq!(sql, "SELECT \"id\", \"status\" FROM \"Order\"");
    }

    #[test]
    fn test_quoted_identifier() {
        let sql = build_projected_query(None, "My\"Table", &cols(&["col1"]), &[0]);
        assert_eq!(sql, "SELECT \"col1\" FROM \"My\"\"Table\"");
    }

    #[test]
    fn test_empty_projection_emits_star() {
        let sql = build_projected_query(None, "t", &cols(&["a", "b"]), &[]);
        assert_eq!(sql, "SELECT * FROM \"t\"");
    }

    #[test]
    fn test_full_projection_in_order_emits_star() {
        let sql = build_projected_query(Some("s"), "t", &cols(&["a", "b", "c"]), &[0, 1, 2]);
        assert_eq!(sql, "SELECT * FROM \"s\".\"t\"");
    }

    #[test]
    fn test_full_projection_reordered_keeps_order() {
        let sql = build_projected_query(None, "t", &cols(&["a", "b", "c"]), &[2, 0, 1]);
        assert_eq!(sql, "SELECT \"c\", \"a\", \"b\" FROM \"t\"");
    }

    #[test]
    fn test_escape_round_trip() {
        let name = "a\"b\"\"c";
        let escaped = escape_identifier(name);
        assert_eq!(escaped, "a\"\"b\"\"\"\"c");
        assert_eq!(escaped.replace("\"\"", "\""), name);
    }

    #[test]
    fn test_select_all_for_rewriter() {
        assert_eq!(
            build_select_all("My\"Table"),
            "SELECT * FROM \"My\"\"Table\""
        );
    }

    #[test]
    fn test_unqualified_when_schema_empty() {
        let sql = build_projected_query(Some(""), "t", &cols(&["a"]), &[]);
        assert_eq!(sql, "SELECT * FROM \"t\"");
    }
}
