//! SQL identifier helpers
//!
//! Identifiers interpolated into generated statements (TRUNCATE, INSERT
//! column lists, table copies) always pass through [`quote_ident`]; data
//! values are always bound as parameters, never interpolated.

use stageload_common::{EtlError, Result};

/// PostgreSQL identifier length limit in bytes.
const MAX_IDENT_BYTES: usize = 63;

/// Quote an identifier for safe interpolation into generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `schema.table` with both parts quoted.
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Validate a plain identifier: letters, digits, underscore, starting with
/// a letter or underscore, at most 63 bytes.
pub fn validate_ident(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EtlError::Config("identifier must not be empty".to_string()));
    }
    if name.len() > MAX_IDENT_BYTES {
        return Err(EtlError::Config(format!(
            "identifier '{}' exceeds the {} byte limit",
            name, MAX_IDENT_BYTES
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(EtlError::Config(format!(
            "identifier '{}' must start with a letter or underscore",
            name
        )));
    }
    for ch in chars {
        if !ch.is_ascii_alphanumeric() && ch != '_' {
            return Err(EtlError::Config(format!(
                "identifier '{}' contains invalid character '{}'",
                name, ch
            )));
        }
    }
    Ok(())
}

/// Parse a `schema.table` reference as accepted by the copy utilities.
pub fn parse_table_ref(reference: &str) -> Result<(String, String)> {
    let mut parts = reference.splitn(2, '.');
    let schema = parts.next().unwrap_or_default();
    let table = parts.next().ok_or_else(|| {
        EtlError::Config(format!(
            "table reference '{}' must be schema-qualified (schema.table)",
            reference
        ))
    })?;
    validate_ident(schema)?;
    validate_ident(table)?;
    Ok((schema.to_string(), table.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_identifiers() {
        assert_eq!(quote_ident("ft_balance_f"), "\"ft_balance_f\"");
        assert_eq!(qualified("ds", "ft_balance_f"), "\"ds\".\"ft_balance_f\"");
    }

    #[test]
    fn doubles_embedded_quotes() {
        assert_eq!(quote_ident("bad\"name"), "\"bad\"\"name\"");
    }

    #[test]
    fn validates_identifiers() {
        assert!(validate_ident("md_account_d").is_ok());
        assert!(validate_ident("_hidden").is_ok());
        assert!(validate_ident("").is_err());
        assert!(validate_ident("1starts_with_digit").is_err());
        assert!(validate_ident("has space").is_err());
        assert!(validate_ident(&"x".repeat(64)).is_err());
    }

    #[test]
    fn parses_schema_qualified_references() {
        let (schema, table) = parse_table_ref("dm.dm_f101_round_f").unwrap();
        assert_eq!(schema, "dm");
        assert_eq!(table, "dm_f101_round_f");

        assert!(parse_table_ref("unqualified").is_err());
        assert!(parse_table_ref("dm.bad name").is_err());
    }
}
