//! Workbook adapter: calamine reads values and merged ranges into the in-memory grid; edit_xlsx
//! replays recorded edits onto the original file so template styles survive.

use calamine::{open_workbook, Data, Reader, Xlsx};
use edit_xlsx::{Format, FormatAlignType, FormatBorderType, WorkSheetCol, Write};
use regex::Regex;
use std::io::{Read, Write as IoWrite};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::read::ZipArchive;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{Error, Result};
use crate::models::{cell_ref, col_index_to_letter, CellStyle, CellValue, MergedRange, Sheet, Workbook};

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(d) => CellValue::Number(d.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

fn open_error(msg: String) -> Error {
    if msg.contains("Could not open") || msg.contains("permission") || msg.contains("Permission") {
        Error::Workbook("Please close the file in Excel first.".to_string())
    } else {
        Error::Workbook(format!("Could not open Excel file: {}", msg))
    }
}

fn save_error(msg: String) -> Error {
    if msg.contains("Permission denied") || msg.contains("being used") {
        Error::Workbook("Please close the file in Excel first.".to_string())
    } else {
        Error::Workbook(format!("Cannot write to file: {}", msg))
    }
}

/// Load every sheet's values and merged ranges (1-based addressing).
pub fn load_workbook(path: &Path) -> Result<Workbook> {
    if !path.exists() {
        return Err(Error::Workbook(format!("File not found: {}", path.display())));
    }
    let mut xlsx: Xlsx<_> = open_workbook(path).map_err(|e: calamine::XlsxError| open_error(e.to_string()))?;
    xlsx.load_merged_regions()
        .map_err(|e| Error::Workbook(format!("Failed to load merged regions: {}", e)))?;

    let mut workbook = Workbook::new();
    for name in xlsx.sheet_names() {
        let range = xlsx
            .worksheet_range(&name)
            .map_err(|e| Error::Workbook(format!("Sheet not found: {}", e)))?;
        let mut sheet = Sheet::new(name.as_str());
        if let Some((row0, col0)) = range.start() {
            for (r, c, data) in range.used_cells() {
                sheet.load_cell(row0 + r as u32 + 1, col0 + c as u32 + 1, cell_value(data));
            }
        }
        let merged = xlsx
            .worksheet_merge_cells(&name)
            .unwrap_or(Ok(Vec::new()))
            .unwrap_or_default();
        for dims in merged {
            sheet.add_merged_range(MergedRange::new(
                dims.start.0 + 1,
                dims.start.1 + 1,
                dims.end.0 + 1,
                dims.end.1 + 1,
            ));
        }
        debug!(
            sheet = %name,
            rows = sheet.max_row(),
            cols = sheet.max_col(),
            merged = sheet.merged_ranges().len(),
            "sheet loaded"
        );
        workbook.add_sheet(sheet);
    }
    Ok(workbook)
}

/// Audit rows: thin border, top/left aligned.
fn bordered_format() -> Format {
    Format::default()
        .set_border(FormatBorderType::Thin)
        .set_align(FormatAlignType::Top)
        .set_align(FormatAlignType::Left)
}

fn header_format() -> Format {
    Format::default()
        .set_bold()
        .set_border(FormatBorderType::Thin)
        .set_align(FormatAlignType::Left)
}

/// Replay recorded edits and created sheets onto `source`, writing the result to `dest` (which may be
/// `source` itself). Nothing is written when any edit fails.
pub fn save_workbook(workbook: &Workbook, source: &Path, dest: &Path) -> Result<()> {
    if !workbook.has_edits() {
        if source != dest {
            std::fs::copy(source, dest)?;
        }
        info!(path = %dest.display(), "no changes to persist");
        return Ok(());
    }
    let mut book = edit_xlsx::Workbook::from_path(source).map_err(|e| open_error(e.to_string()))?;
    let bordered = bordered_format();
    let header = header_format();

    for sheet in workbook.sheets() {
        if !sheet.is_created() && sheet.edits().is_empty() {
            continue;
        }
        let worksheet = if sheet.is_created() {
            book.add_worksheet_by_name(sheet.name())
                .map_err(|e| Error::Workbook(format!("Could not add sheet '{}': {}", sheet.name(), e)))?
        } else {
            book.get_worksheet_mut_by_name(sheet.name())
                .map_err(|e| Error::Workbook(format!("Sheet not found: {}", e)))?
        };
        for edit in sheet.edits() {
            let loc = cell_ref(edit.row, edit.col);
            let format = match edit.style {
                CellStyle::Keep => None,
                CellStyle::Bordered => Some(&bordered),
                CellStyle::Header => Some(&header),
            };
            let written = match (&edit.value, format) {
                (CellValue::Number(n), None) => worksheet.write(&loc, *n),
                (CellValue::Number(n), Some(f)) => worksheet.write_with_format(&loc, *n, f),
                (value, None) => worksheet.write_string(&loc, sanitize_cell(&value.as_text())),
                (value, Some(f)) => worksheet.write_string_with_format(&loc, sanitize_cell(&value.as_text()), f),
            };
            written.map_err(|e| Error::Workbook(format!("Could not write {}!{}: {}", sheet.name(), loc, e)))?;
        }
        for (col, width) in sheet.column_widths() {
            let letter = col_index_to_letter(col.saturating_sub(1));
            worksheet
                .set_columns_width(&format!("{0}:{0}", letter), width)
                .map_err(|e| Error::Workbook(e.to_string()))?;
        }
        debug!(sheet = sheet.name(), edits = sheet.edits().len(), "edits replayed");
    }

    book.save_as(dest).map_err(|e| save_error(e.to_string()))?;
    // Strip drawing parts so Excel won't show "Repairs... Removed Part: Drawing shape"
    let removed = strip_drawings_from_xlsx(dest)
        .map_err(|e| Error::Workbook(format!("Could not strip drawings: {}", e)))?;
    if removed > 0 {
        warn!(
            path = %dest.display(),
            parts = removed,
            "removed drawing and image parts (logos, shapes) from the saved workbook"
        );
    }
    info!(path = %dest.display(), "workbook saved");
    Ok(())
}

/// Strip drawing and image parts from an xlsx (zip) file so Excel won't
/// show "Repairs to ... Removed Part: Drawing shape" when opening.
/// Worksheet XML is copied unchanged. Returns the number of parts removed.
fn strip_drawings_from_xlsx(path: &Path) -> std::result::Result<usize, String> {
    use std::fs::File;

    let file = File::open(path).map_err(|e| format!("Could not open for strip: {}", e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| format!("Invalid zip: {}", e))?;

    let temp_path = path.with_extension("tmp.xlsx");
    let out_file = File::create(&temp_path).map_err(|e| format!("Could not create temp: {}", e))?;
    let mut zip_writer = ZipWriter::new(out_file);
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let rel_drawing_re = Regex::new(r#"<Relationship[^>]*drawing[^>]*/>"#).map_err(|e| e.to_string())?;
    let ct_drawing_re =
        Regex::new(r#"<Override\s+PartName="/xl/drawings/[^"]*"[^>]*/>"#).map_err(|e| e.to_string())?;
    let ct_media_re = Regex::new(r#"<Override\s+PartName="/xl/media/[^"]*"[^>]*/>"#).map_err(|e| e.to_string())?;

    let mut removed = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| format!("Entry {}: {}", i, e))?;
        let name = entry.name().replace('\\', "/");
        if name.starts_with("xl/drawings/") || name.starts_with("xl/media/") {
            removed += 1;
            continue;
        }
        let mut data = Vec::new();
        entry.read_to_end(&mut data).map_err(|e| format!("Read {}: {}", name, e))?;

        zip_writer.start_file(name.as_str(), opts).map_err(|e| e.to_string())?;
        if name == "[Content_Types].xml" {
            let s = String::from_utf8_lossy(&data);
            let out = ct_drawing_re.replace_all(&s, "");
            let out = ct_media_re.replace_all(&out, "");
            zip_writer.write_all(out.as_bytes()).map_err(|e| e.to_string())?;
        } else if name.contains("worksheets/_rels/") && name.ends_with(".rels") {
            let s = String::from_utf8_lossy(&data);
            let out = rel_drawing_re.replace_all(&s, "");
            zip_writer.write_all(out.as_bytes()).map_err(|e| e.to_string())?;
        } else {
            zip_writer.write_all(&data).map_err(|e| e.to_string())?;
        }
    }
    zip_writer.finish().map_err(|e| e.to_string())?;
    std::fs::rename(&temp_path, path).map_err(|e| format!("Replace file: {}", e))?;
    Ok(removed)
}

/// Remove or replace characters that can corrupt Excel's sheet XML and cause "unreadable content".
/// Drops control chars (except tab, newline, CR). Replaces & < > so raw XML is never broken.
fn sanitize_cell(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let u = c as u32;
        if c == '\t' || c == '\n' || c == '\r' {
            out.push(c);
        } else if u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF {
            // skip control and invalid
        } else {
            match c {
                '&' => out.push_str(" y "),
                '<' | '>' => out.push(' '),
                _ => out.push(c),
            }
        }
    }
    out
}
