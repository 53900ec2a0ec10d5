//! Minimal RFC 4180 CSV writer used by the export endpoints.

/// A row that can be rendered into a CSV export
pub trait CsvRecord {
    fn headers() -> &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

/// Quote a field when it contains a separator, quote or line break
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line = fields
        .into_iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

/// Render a header row followed by one line per record
pub fn to_csv<T: CsvRecord>(records: &[T]) -> String {
    let mut out = String::new();
    write_row(&mut out, T::headers().iter().copied());
    for record in records {
        write_row(&mut out, record.fields());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        name: String,
        note: Option<String>,
    }

    impl CsvRecord for Row {
        fn headers() -> &'static [&'static str] {
            &["name", "note"]
        }

        fn fields(&self) -> Vec<String> {
            vec![self.name.clone(), self.note.clone().unwrap_or_default()]
        }
    }

    #[test]
    fn test_plain_field_untouched() {
        assert_eq!(escape_field("Harbor Point"), "Harbor Point");
    }

    #[test]
    fn test_field_with_comma_and_quote() {
        assert_eq!(escape_field("Suite 4, \"A\""), "\"Suite 4, \"\"A\"\"\"");
        assert_eq!(escape_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_to_csv_writes_header_and_rows() {
        let rows = vec![
            Row { name: "Dock 7".into(), note: None },
            Row { name: "Tower, East".into(), note: Some("corner".into()) },
        ];
        let csv = to_csv(&rows);
        assert_eq!(csv, "name,note\r\nDock 7,\r\n\"Tower, East\",corner\r\n");
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let csv = to_csv::<Row>(&[]);
        assert_eq!(csv, "name,note\r\n");
    }
}
