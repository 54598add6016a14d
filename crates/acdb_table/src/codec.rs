//! JSON-lines encoding for tables.
//!
//! One row per line, columns sorted by name. Encoding is deterministic, so
//! equal tables produce byte-identical output.

use crate::error::{TableError, TableResult};
use crate::table::{Row, Table};

/// Encodes a table as JSON lines.
pub fn to_jsonl(table: &Table) -> TableResult<Vec<u8>> {
    let mut buf = Vec::new();
    for row in table {
        serde_json::to_writer(&mut buf, row)
            .map_err(|e| TableError::encoding_failed(e.to_string()))?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Decodes a JSON-lines table. Blank lines are skipped.
pub fn from_jsonl(bytes: &[u8]) -> TableResult<Table> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| TableError::decoding_failed(0, format!("invalid UTF-8: {e}")))?;

    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: Row = serde_json::from_str(line)
            .map_err(|e| TableError::decoding_failed(idx + 1, e.to_string()))?;
        rows.push(row);
    }
    Ok(Table::from_rows(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn encoding_is_deterministic() {
        let a = Row::new().with("z", 1).with("a", "x");
        let b = Row::new().with("a", "x").with("z", 1);
        let ta = Table::from_rows(vec![a]);
        let tb = Table::from_rows(vec![b]);
        assert_eq!(to_jsonl(&ta).unwrap(), to_jsonl(&tb).unwrap());
        assert_eq!(to_jsonl(&ta).unwrap(), b"{\"a\":\"x\",\"z\":1}\n".to_vec());
    }

    #[test]
    fn decode_skips_blank_lines() {
        let table = from_jsonl(b"{\"id\":1}\n\n{\"id\":2.5}\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].get("id"), Some(&Value::Float(2.5)));
    }

    #[test]
    fn decode_reports_line_number() {
        let err = from_jsonl(b"{\"id\":1}\nnot json\n").unwrap_err();
        assert!(matches!(err, TableError::DecodingFailed { line: 2, .. }));
    }

    #[test]
    fn empty_table_encodes_to_nothing() {
        assert!(to_jsonl(&Table::new()).unwrap().is_empty());
        assert!(from_jsonl(b"").unwrap().is_empty());
    }
}
