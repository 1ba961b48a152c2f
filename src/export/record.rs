//! CEP record decoding and row projection
//!
//! Values are JSON objects. Only string-valued fields are exported; any
//! other JSON type, or a missing field, becomes an empty column.

use crate::error::RecordError;
use serde_json::{Map, Value};

/// Record fields, in output column order (after the key column)
pub const FIELDS: [&str; 8] = [
    "bairro",
    "cep",
    "cidade",
    "codigo_ibge",
    "logradouro",
    "nome_origem",
    "tipo_origem",
    "uf",
];

/// Number of columns in every output row
pub const COLUMN_COUNT: usize = FIELDS.len() + 1;

/// One output row: the stripped key followed by the record fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    columns: [String; COLUMN_COUNT],
}

impl Row {
    /// Build a row from the stripped key and a decoded record
    pub fn project(code: &str, record: &Map<String, Value>) -> Self {
        let columns = std::array::from_fn(|i| match i {
            0 => code.to_string(),
            _ => string_field(record, FIELDS[i - 1]),
        });

        Self { columns }
    }

    /// Columns in output order
    pub fn columns(&self) -> &[String; COLUMN_COUNT] {
        &self.columns
    }

    /// The stripped key
    pub fn code(&self) -> &str {
        &self.columns[0]
    }
}

/// Decode a stored value into a record
///
/// A top-level `null` decodes to an empty record; any other non-object
/// value is malformed.
pub fn decode_record(value: &[u8]) -> Result<Map<String, Value>, RecordError> {
    let record: Option<Map<String, Value>> = serde_json::from_slice(value)?;
    Ok(record.unwrap_or_default())
}

/// Build the row for a full key and its stored value
pub fn build_row(prefix: &[u8], key: &[u8], value: &[u8]) -> Result<Row, RecordError> {
    let code = key.strip_prefix(prefix).ok_or(RecordError::OutsidePrefix)?;
    let record = decode_record(value)?;
    Ok(Row::project(&String::from_utf8_lossy(code), &record))
}

fn string_field(record: &Map<String, Value>, name: &str) -> String {
    match record.get(name) {
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SE: &str = concat!(
        r#"{"bairro":"Centro","cep":"01000000","cidade":"São Paulo","#,
        r#""codigo_ibge":"3550308","logradouro":"Praça da Sé","#,
        r#""nome_origem":"x","tipo_origem":"y","uf":"SP"}"#,
    );

    #[test]
    fn test_full_record() {
        let row = build_row(b"cep:", b"cep:01000000", SE.as_bytes()).unwrap();
        assert_eq!(
            row.columns(),
            &[
                "01000000",
                "Centro",
                "01000000",
                "São Paulo",
                "3550308",
                "Praça da Sé",
                "x",
                "y",
                "SP"
            ]
            .map(String::from)
        );
        assert_eq!(row.code(), "01000000");
    }

    #[test]
    fn test_missing_and_non_string_fields_are_empty() {
        let value = br#"{"bairro":null,"cep":1000000,"cidade":["x"],"uf":"RJ","extra":"ignored"}"#;
        let row = build_row(b"cep:", b"cep:20000000", value).unwrap();

        assert_eq!(row.columns()[1], "");
        assert_eq!(row.columns()[2], "");
        assert_eq!(row.columns()[3], "");
        assert_eq!(row.columns()[4], "");
        assert_eq!(row.columns()[8], "RJ");
        assert!(row.columns().iter().all(|c| c != "null"));
    }

    #[test]
    fn test_null_value_is_an_empty_record() {
        let row = build_row(b"cep:", b"cep:1", b"null").unwrap();
        assert_eq!(row.code(), "1");
        assert!(row.columns()[1..].iter().all(String::is_empty));
    }

    #[test]
    fn test_malformed_values() {
        let values: [&[u8]; 5] = [b"\xff\xfe", b"{not json", b"[1,2]", b"\"text\"", b""];
        for value in values {
            assert!(matches!(
                build_row(b"cep:", b"cep:1", value),
                Err(RecordError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_key_outside_prefix() {
        assert!(matches!(
            build_row(b"cep:", b"cidade:1", b"{}"),
            Err(RecordError::OutsidePrefix)
        ));
    }
}
