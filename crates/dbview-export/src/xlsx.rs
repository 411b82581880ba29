use crate::record::{ExportValue, TableExport};
use crate::Result;
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use std::collections::HashSet;

const MAX_SHEET_NAME_CHARS: usize = 31;
const INVALID_SHEET_CHARS: [char; 7] = ['[', ']', ':', '*', '?', '/', '\\'];

/// Turn a table name into a worksheet name Excel accepts, unique within
/// `taken` (compared case-insensitively).
pub fn sheet_name(table: &str, taken: &mut HashSet<String>) -> String {
    let cleaned: String = table
        .chars()
        .map(|c| if INVALID_SHEET_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches('\'');
    let mut base: String = cleaned.chars().take(MAX_SHEET_NAME_CHARS).collect();
    if base.is_empty() || base.eq_ignore_ascii_case("history") {
        base = format!("Sheet{}", taken.len() + 1);
    }

    let mut candidate = base.clone();
    let mut n = 2;
    while taken.contains(&candidate.to_lowercase()) {
        let suffix = format!("_{n}");
        let keep = MAX_SHEET_NAME_CHARS - suffix.chars().count();
        candidate = base.chars().take(keep).collect::<String>() + &suffix;
        n += 1;
    }
    taken.insert(candidate.to_lowercase());
    candidate
}

fn write_sheet(worksheet: &mut Worksheet, export: &TableExport) -> std::result::Result<(), XlsxError> {
    for (col, name) in export.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }

    for (idx, record) in export.records().iter().enumerate() {
        let row = (idx + 1) as u32;
        for (col, (_, value)) in record.fields.iter().enumerate() {
            let col = col as u16;
            match value {
                ExportValue::Null => {}
                ExportValue::Integer(i) => {
                    worksheet.write_number(row, col, *i as f64)?;
                }
                ExportValue::Real(f) => {
                    worksheet.write_number(row, col, *f)?;
                }
                ExportValue::Text(s) => {
                    worksheet.write_string(row, col, s)?;
                }
            }
        }
    }
    Ok(())
}

/// Single-sheet workbook for one table.
pub fn to_xlsx(export: &TableExport) -> Result<Vec<u8>> {
    to_workbook(std::slice::from_ref(export))
}

/// One sheet per table, in the given order.
pub fn to_workbook(exports: &[TableExport]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let mut taken = HashSet::new();
    for export in exports {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name(&export.table_name, &mut taken))?;
        write_sheet(worksheet, export)?;
    }
    if exports.is_empty() {
        // A workbook needs at least one sheet.
        workbook.add_worksheet();
    }
    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_sanitized_and_unique() {
        let mut taken = HashSet::new();
        assert_eq!(sheet_name("sales/2024", &mut taken), "sales_2024");
        assert_eq!(sheet_name("Sales_2024", &mut taken), "Sales_2024_2");
        assert_eq!(sheet_name("'quoted'", &mut taken), "quoted");

        let long = "a".repeat(40);
        let first = sheet_name(&long, &mut taken);
        assert_eq!(first.chars().count(), 31);
        let second = sheet_name(&long, &mut taken);
        assert_eq!(second, format!("{}_2", "a".repeat(29)));
    }
}
