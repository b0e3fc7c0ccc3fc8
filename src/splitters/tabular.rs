//! Tabular splitter for CSV files and XLSX workbooks.
//!
//! Rows serialize to a comma-delimited text form and accumulate into
//! segments under a character ceiling. The header row is prepended to
//! every segment and excluded from the ceiling, so each segment reads as
//! a self-contained table. Each worksheet of a workbook chunks
//! independently under a sheet-qualified file name.

use std::io::Read;

use csv::ReaderBuilder;

use crate::error::IngestError;

/// Decompressed size ceiling for a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Sheets beyond this are ignored.
const MAX_SHEETS: usize = 100;

/// Segments for one logical table, under its effective file name.
#[derive(Debug)]
pub struct TableSegments {
    pub file_name: String,
    pub segments: Vec<String>,
}

/// Split CSV bytes into header-prefixed segments.
pub fn split_csv(
    bytes: &[u8],
    file_name: &str,
    max_chars: usize,
) -> Result<TableSegments, IngestError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(bytes);

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Validation(format!("failed to read CSV header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| IngestError::Validation(format!("failed to read CSV row: {e}")))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(TableSegments {
        file_name: file_name.to_string(),
        segments: chunk_rows(&header, &rows, max_chars),
    })
}

/// Split every worksheet of an XLSX workbook. Multi-sheet workbooks get
/// `"<name> (<sheet>)"` file names; a single sheet keeps the original.
pub fn split_xlsx(
    bytes: &[u8],
    file_name: &str,
    max_chars: usize,
) -> Result<Vec<TableSegments>, IngestError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| IngestError::Validation(format!("not a valid workbook: {e}")))?;

    let shared_strings = read_shared_strings(&mut archive)?;
    let sheet_names = read_sheet_names(&mut archive)?;
    let worksheet_entries = list_worksheet_entries(&archive);
    let multi_sheet = worksheet_entries.len() > 1;

    let mut tables = Vec::new();
    for (idx, entry_name) in worksheet_entries.into_iter().take(MAX_SHEETS).enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, &entry_name, MAX_XML_ENTRY_BYTES)?;
        let rows = parse_sheet_rows(&xml, &shared_strings)?;
        if rows.is_empty() {
            continue;
        }

        let sheet_label = sheet_names
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("Sheet{}", idx + 1));
        let effective_name = if multi_sheet {
            format!("{file_name} ({sheet_label})")
        } else {
            file_name.to_string()
        };

        let (header, data) = rows.split_first().map(|(h, d)| (h.clone(), d.to_vec())).unwrap_or((Vec::new(), Vec::new()));
        tables.push(TableSegments {
            file_name: effective_name,
            segments: chunk_rows(&header, &data, max_chars),
        });
    }

    Ok(tables)
}

/// Accumulate serialized rows under `max_chars`, header excluded from the
/// ceiling and prepended to every segment. A single oversized row still
/// forms its own segment. Every row keeps its slot, so concatenating the
/// segments' data rows reproduces the original sequence.
fn chunk_rows(header: &[String], rows: &[Vec<String>], max_chars: usize) -> Vec<String> {
    let header_line = header.join(", ");
    let mut segments = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut buffer_chars = 0;

    for row in rows {
        let line = row.join(", ");
        let added = if buffer.is_empty() {
            line.chars().count()
        } else {
            line.chars().count() + 1
        };
        if !buffer.is_empty() && buffer_chars + added > max_chars {
            segments.push(assemble(&header_line, &buffer));
            buffer.clear();
            buffer_chars = 0;
        }
        buffer_chars += if buffer.is_empty() {
            line.chars().count()
        } else {
            line.chars().count() + 1
        };
        buffer.push(line);
    }
    if !buffer.is_empty() {
        segments.push(assemble(&header_line, &buffer));
    }

    segments
}

fn assemble(header_line: &str, rows: &[String]) -> String {
    if header_line.is_empty() {
        rows.join("\n")
    } else {
        format!("{header_line}\n{}", rows.join("\n"))
    }
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, IngestError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| IngestError::Validation(format!("workbook entry {name}: {e}")))?;
    let mut out = Vec::new();
    entry.take(max_bytes).read_to_end(&mut out)?;
    if out.len() as u64 >= max_bytes {
        return Err(IngestError::Validation(format!(
            "workbook entry {name} exceeds size limit"
        )));
    }
    Ok(out)
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, IngestError> {
    // Workbooks without string cells omit the part entirely.
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;

    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        current.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = false;
                    strings.push(std::mem::take(&mut current));
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(IngestError::Validation(format!(
                    "invalid sharedStrings.xml: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Display names from xl/workbook.xml, in declaration order. Declaration
/// order matches the worksheet part numbering for workbooks we accept.
fn read_sheet_names(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, IngestError> {
    let xml = read_zip_entry_bounded(archive, "xl/workbook.xml", MAX_XML_ENTRY_BYTES)?;

    let mut names = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            names.push(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(IngestError::Validation(format!("invalid workbook.xml: {e}")))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(names)
}

fn list_worksheet_entries(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Cell grid for one worksheet. Handles shared-string and inline values.
fn parse_sheet_rows(
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Vec<Vec<String>>, IngestError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_row: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut in_value = false;
    let mut cell_is_shared = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = true;
                    current_row.clear();
                }
                b"c" => {
                    cell_is_shared = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                }
                b"v" | b"t" if in_row => in_value = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                let raw = te.unescape().unwrap_or_default();
                let value = raw.trim();
                if cell_is_shared {
                    if let Ok(idx) = value.parse::<usize>() {
                        if let Some(s) = shared_strings.get(idx) {
                            current_row.push(s.clone());
                        }
                    }
                } else if !value.is_empty() {
                    current_row.push(value.to_string());
                }
                in_value = false;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = false;
                    if !current_row.is_empty() {
                        rows.push(std::mem::take(&mut current_row));
                    }
                }
                b"v" | b"t" => in_value = false,
                b"c" => cell_is_shared = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => {
                return Err(IngestError::Validation(format!("invalid worksheet xml: {e}")))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_header_prepended_to_every_segment() {
        let csv = b"name,age\nAda,36\nAlan,41\nGrace,85\nEdsger,72\nBarbara,86\n";
        // Ceiling of 18 chars fits two data rows per segment.
        let table = split_csv(csv, "people.csv", 18).unwrap();
        assert!(table.segments.len() > 1);
        for segment in &table.segments {
            assert!(segment.starts_with("name, age\n"), "missing header: {segment}");
        }
    }

    #[test]
    fn csv_rows_reassemble_in_order() {
        let csv = b"h1,h2\nr1a,r1b\nr2a,r2b\nr3a,r3b\nr4a,r4b\nr5a,r5b\n";
        let table = split_csv(csv, "t.csv", 20).unwrap();
        let data_rows: Vec<&str> = table
            .segments
            .iter()
            .flat_map(|s| s.lines().skip(1))
            .collect();
        assert_eq!(
            data_rows,
            vec!["r1a, r1b", "r2a, r2b", "r3a, r3b", "r4a, r4b", "r5a, r5b"]
        );
    }

    #[test]
    fn rows_with_only_empty_fields_keep_their_slot() {
        let csv = b"a,b\n1,2\n,\n3,4\n";
        let table = split_csv(csv, "t.csv", 800).unwrap();
        let data_rows: Vec<&str> = table
            .segments
            .iter()
            .flat_map(|s| s.lines().skip(1))
            .collect();
        assert_eq!(data_rows, vec!["1, 2", ", ", "3, 4"]);
    }

    #[test]
    fn csv_five_rows_three_per_segment_gives_two_segments() {
        let csv = b"h\naaa\nbbb\nccc\nddd\neee\n";
        // Three 3-char rows plus separators is 11 chars.
        let table = split_csv(csv, "t.csv", 11).unwrap();
        assert_eq!(table.segments.len(), 2);
        assert_eq!(table.segments[0].lines().count(), 4);
        assert_eq!(table.segments[1].lines().count(), 3);
    }

    #[test]
    fn oversized_single_row_forms_own_segment() {
        let big = "x".repeat(900);
        let csv = format!("h\nsmall\n{big}\ntiny\n");
        let table = split_csv(csv.as_bytes(), "t.csv", 800).unwrap();
        assert_eq!(table.segments.len(), 3);
        assert!(table.segments[1].contains(&big));
    }

    #[test]
    fn header_excluded_from_ceiling() {
        let long_header = format!("{}\n", "h".repeat(790));
        let csv = format!("{long_header}aaa\nbbb\n");
        let table = split_csv(csv.as_bytes(), "t.csv", 800).unwrap();
        // Both rows fit because the header does not count.
        assert_eq!(table.segments.len(), 1);
    }

    #[test]
    fn invalid_workbook_rejected() {
        let err = split_xlsx(b"not a zip", "t.xlsx", 800).unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }
}
