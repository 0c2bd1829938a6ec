// 🏗️ Delimited Record Parser
// Decoded text + delimiter -> named-field records, header row authoritative
//
// The header row is validated once, up front: if any required column is
// missing, nothing is yielded at all.

use std::fmt;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Trim};
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

// ============================================================================
// DELIMITER
// ============================================================================

/// Column separator, chosen out-of-band (never sniffed from content)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Comma,
    Semicolon,
    Tab,
    Colon,
}

impl Delimiter {
    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Semicolon => b';',
            Delimiter::Tab => b'\t',
            Delimiter::Colon => b':',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Delimiter::Comma => "comma",
            Delimiter::Semicolon => "semicolon",
            Delimiter::Tab => "tab",
            Delimiter::Colon => "colon",
        }
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Delimiter {
    type Err = ImportError;

    /// Accepts the option names ("semicolon") or the literal character (";")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "comma" | "," => Ok(Delimiter::Comma),
            "semicolon" | ";" => Ok(Delimiter::Semicolon),
            "tab" | "\t" | "\\t" => Ok(Delimiter::Tab),
            "colon" | ":" => Ok(Delimiter::Colon),
            _ => Err(ImportError::UnsupportedDelimiter(s.to_string())),
        }
    }
}

// ============================================================================
// REQUIRED COLUMNS
// ============================================================================

/// The closed set of columns every catalog CSV must declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ParentExternalId,
    ExternalId,
    ShortName,
    Description,
    IsStructural,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::ParentExternalId,
        Column::ExternalId,
        Column::ShortName,
        Column::Description,
        Column::IsStructural,
    ];

    /// Exact header text as exported by the catalog publisher
    pub fn header(&self) -> &'static str {
        match self {
            Column::ParentExternalId => "Número ID paterno",
            Column::ExternalId => "Número ID",
            Column::ShortName => "Nombre_corto",
            Column::Description => "Descripción",
            Column::IsStructural => "Es estructura",
        }
    }

    fn slot(&self) -> usize {
        match self {
            Column::ParentExternalId => 0,
            Column::ExternalId => 1,
            Column::ShortName => 2,
            Column::Description => 3,
            Column::IsStructural => 4,
        }
    }
}

/// Position of every required column within the file's header row
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnMap {
    positions: [usize; 5],
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self, ImportError> {
        let mut positions = [0usize; 5];
        let mut missing = Vec::new();

        for column in Column::ALL {
            match headers.iter().position(|h| h == column.header()) {
                Some(pos) => positions[column.slot()] = pos,
                None => missing.push(column.header().to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(ImportError::MissingColumns(missing));
        }

        Ok(ColumnMap { positions })
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// One data row, keyed by required column. Values are untrimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based line in the source text
    pub line: u64,
    fields: [String; 5],
}

impl Record {
    pub fn new(line: u64, fields: [String; 5]) -> Self {
        Record { line, fields }
    }

    pub fn get(&self, column: Column) -> &str {
        &self.fields[column.slot()]
    }

    /// Structural rows (framework / level scaffolding) carry the literal "1"
    pub fn is_structural(&self) -> bool {
        self.get(Column::IsStructural).trim() == "1"
    }
}

// ============================================================================
// DELIMITED SOURCE
// ============================================================================

/// Validated delimited text. `records()` can be called any number of times;
/// each call starts a fresh pass from the first data row.
#[derive(Debug, Clone)]
pub struct DelimitedSource {
    text: String,
    delimiter: Delimiter,
    columns: ColumnMap,
}

impl DelimitedSource {
    pub fn new(text: String, delimiter: Delimiter) -> Result<Self, ImportError> {
        let headers = {
            let mut reader = reader_for(&text, delimiter);
            reader.headers()?.clone()
        };
        let columns = ColumnMap::from_headers(&headers)?;

        Ok(DelimitedSource {
            text,
            delimiter,
            columns,
        })
    }

    pub fn records(&self) -> Records<'_> {
        Records {
            inner: reader_for(&self.text, self.delimiter).into_records(),
            columns: &self.columns,
        }
    }
}

fn reader_for(text: &str, delimiter: Delimiter) -> csv::Reader<&[u8]> {
    ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter.as_byte())
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(text.as_bytes())
}

/// Lazy iterator over the data rows of a `DelimitedSource`
pub struct Records<'a> {
    inner: StringRecordsIntoIter<&'a [u8]>,
    columns: &'a ColumnMap,
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let raw = match self.inner.next()? {
            Ok(raw) => raw,
            Err(e) => return Some(Err(e)),
        };

        let line = raw.position().map(|p| p.line()).unwrap_or(0);
        // Short rows are tolerated; absent cells read as empty
        let field = |column: Column| {
            raw.get(self.columns.positions[column.slot()])
                .unwrap_or("")
                .to_string()
        };

        Some(Ok(Record::new(
            line,
            [
                field(Column::ParentExternalId),
                field(Column::ExternalId),
                field(Column::ShortName),
                field(Column::Description),
                field(Column::IsStructural),
            ],
        )))
    }
}
