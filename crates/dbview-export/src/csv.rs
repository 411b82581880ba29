use crate::record::TableExport;
use std::borrow::Cow;

const LINE_END: &str = "\r\n";

/// Quote a field iff it contains a comma, a double quote or a newline.
pub fn escape_csv(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn push_line<S: AsRef<str>>(out: &mut String, fields: impl IntoIterator<Item = S>) {
    for (idx, field) in fields.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&escape_csv(field.as_ref()));
    }
    out.push_str(LINE_END);
}

/// Header line plus one CRLF-terminated line per row. `NULL` is an empty
/// field; blobs are written as their lossy text.
pub fn to_csv(export: &TableExport) -> String {
    let mut out = String::new();
    push_line(&mut out, &export.columns);
    for row in &export.rows {
        push_line(&mut out, row.iter().map(|v| v.export_text()));
    }
    out
}
