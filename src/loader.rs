//! Table Loader - turns a delimited byte stream into a frame of raw text columns

use crate::config::SourceLayout;
use crate::error::{PipelineError, Result, Stage};
use csv::ReaderBuilder;
use encoding_rs::{DecoderResult, Encoding};
use polars::prelude::*;
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::debug;

/// Decode `bytes` strictly; any sequence invalid under `encoding` is an error.
pub fn decode<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Result<Cow<'a, str>> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or_else(|| PipelineError::Decode {
            encoding: encoding.name().to_string(),
            offset: first_invalid_offset(bytes, encoding),
        })
}

/// Byte offset of the first malformed sequence, or `bytes.len()` when none.
fn first_invalid_offset(bytes: &[u8], encoding: &'static Encoding) -> usize {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(bytes.len())
        .unwrap_or(bytes.len().saturating_mul(4));
    let mut out = String::with_capacity(capacity);
    let mut offset = 0;

    loop {
        let (result, read) = decoder.decode_to_string_without_replacement(&bytes[offset..], &mut out, true);
        offset += read;
        match result {
            DecoderResult::Malformed(bad, after) => return offset.saturating_sub(bad as usize + after as usize),
            DecoderResult::InputEmpty => return offset,
            DecoderResult::OutputFull => {
                out.clear();
                out.reserve(capacity);
            }
        }
    }
}

/// Drop the first `count` physical lines.
fn skip_lines(text: &str, count: usize) -> &str {
    let mut rest = text;
    for _ in 0..count {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

/// Load one extract: decode, skip leading lines, take the header from the
/// first remaining row and keep the configured inclusive column range.
/// Every retained column is text; empty cells are null.
pub fn load_table(bytes: &[u8], layout: &SourceLayout) -> Result<DataFrame> {
    let encoding = layout.resolve_encoding()?;
    let text = decode(bytes, encoding)?;
    let body = skip_lines(&text, layout.skip_rows);

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut records = rdr.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| {
            PipelineError::schema(Stage::Loader, format!("Failed to read header row: {}", e))
        })?,
        None => {
            return Err(PipelineError::schema(
                Stage::Loader,
                format!("no header row after skipping {} line(s)", layout.skip_rows),
            ))
        }
    };

    if layout.last_column >= header.len() {
        return Err(PipelineError::schema(
            Stage::Loader,
            format!(
                "requested columns {}..={} but the header has {} column(s)",
                layout.first_column,
                layout.last_column,
                header.len()
            ),
        ));
    }

    let range = layout.first_column..=layout.last_column;
    let names: Vec<String> = range
        .clone()
        .map(|idx| {
            let name = header.get(idx).unwrap_or("");
            if name.trim().is_empty() {
                format!("column_{}", idx)
            } else {
                name.to_string()
            }
        })
        .collect();

    let mut seen = HashSet::new();
    for name in &names {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::schema(
                Stage::Loader,
                format!("duplicate column name '{}'", name),
            ));
        }
    }

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for (row_idx, result) in records.enumerate() {
        let record = result.map_err(|e| {
            PipelineError::schema(Stage::Loader, format!("Failed to read data row {}: {}", row_idx + 1, e))
        })?;
        for (slot, idx) in range.clone().enumerate() {
            let cell = record.get(idx).filter(|c| !c.is_empty());
            columns[slot].push(cell.map(|c| c.to_string()));
        }
    }

    let series: Vec<Series> = names
        .iter()
        .zip(columns)
        .map(|(name, values)| Series::new(name, values))
        .collect();
    let df = DataFrame::new(series)?;

    debug!(
        encoding = encoding.name(),
        rows = df.height(),
        columns = df.width(),
        "loaded table"
    );
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(last_column: usize) -> SourceLayout {
        SourceLayout::new("ISO-8859-1", 1, 0, last_column)
    }

    #[test]
    fn test_skips_leading_row_and_trailing_columns() {
        let csv = "junk line,,,\nA,B,C,Unnamed\n1,x,,\n2,y,z,\n";
        let df = load_table(csv.as_bytes(), &layout(2)).unwrap();

        assert_eq!(df.get_column_names(), vec!["A", "B", "C"]);
        assert_eq!(df.height(), 2);
        let c = df.column("C").unwrap().str().unwrap();
        assert_eq!(c.get(0), None);
        assert_eq!(c.get(1), Some("z"));
    }

    #[test]
    fn test_multiline_quoted_header() {
        let csv = "\n\"Registered\nCharity\nNumber\",Name\n20001,Alpha\n";
        let df = load_table(csv.as_bytes(), &layout(1)).unwrap();
        assert_eq!(df.get_column_names()[0], "Registered\nCharity\nNumber");
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn test_range_beyond_header_is_schema_error() {
        let csv = "skip\nA,B\n1,2\n";
        let err = load_table(csv.as_bytes(), &layout(5)).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { stage: Stage::Loader, .. }));
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let bytes = b"skip\nA,B\n1,\xff\n";
        let utf8 = SourceLayout::new("utf-8", 1, 0, 1);
        let err = load_table(bytes, &utf8).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { offset: 11, .. }));
    }

    #[test]
    fn test_decode_offset_for_multibyte_encoding() {
        let shift_jis = Encoding::for_label(b"shift_jis").unwrap();
        let err = decode(b"ab,cd\n\xa0", shift_jis).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { offset: 6, .. }));
    }

    #[test]
    fn test_decode_borrows_valid_input() {
        let bytes = b"A,B\n1,2\n".to_vec();
        let text = decode(&bytes, encoding_rs::UTF_8).unwrap();
        assert!(matches!(text, Cow::Borrowed("A,B\n1,2\n")));
    }

    #[test]
    fn test_latin1_bytes_decode() {
        let bytes = b"skip\nCountry\nPoblacht na h\xc9ireann\n";
        let df = load_table(bytes, &layout(0)).unwrap();
        let country = df.column("Country").unwrap().str().unwrap();
        assert_eq!(country.get(0), Some("Poblacht na hÉireann"));
    }

    #[test]
    fn test_short_rows_padded_with_nulls() {
        let csv = "skip\nA,B,C\n1\n";
        let df = load_table(csv.as_bytes(), &layout(2)).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("C").unwrap().null_count(), 1);
    }
}
