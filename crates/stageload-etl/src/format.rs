//! Delimited-format detection
//!
//! Inspects a file's leading bytes to infer delimiter, quoting, and header
//! presence. Extracts delivered by upstream systems are semicolon-delimited
//! with a header; anything else goes through a lightweight statistical
//! sniffer over the first kilobyte.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use stageload_common::{EtlError, Result};
use tracing::info;

/// Bytes sampled for sniffing.
const SAMPLE_BYTES: usize = 1024;

/// Delimiters the sniffer considers, in preference order.
const CANDIDATE_DELIMITERS: &[u8] = &[b',', b'\t', b';', b'|'];

/// Sample lines inspected by the sniffer.
const SNIFF_LINES: usize = 10;

/// Inferred dialect of a delimited text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub quote: u8,
    pub has_header: bool,
}

/// Detect the dialect of the file at `path`.
///
/// The first line decides: a semicolon anywhere in it selects the
/// semicolon/double-quote/header dialect outright; otherwise the sampled
/// prefix is sniffed. Fails when the file cannot be opened or holds no
/// header-like first line.
pub fn detect_format(path: &Path) -> Result<CsvFormat> {
    let mut reader = open_after_bom(path)?;

    let mut buf = vec![0u8; SAMPLE_BYTES];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let sample = String::from_utf8_lossy(&buf[..filled]);

    let first_line = sample
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .ok_or_else(|| EtlError::FormatDetection {
            path: path.to_path_buf(),
            reason: "file holds no header line".to_string(),
        })?;

    let format = if first_line.contains(';') {
        CsvFormat {
            delimiter: b';',
            quote: b'"',
            has_header: true,
        }
    } else {
        sniff(&sample, path)?
    };

    info!(
        path = %path.display(),
        delimiter = %char::from(format.delimiter).escape_default(),
        quote = %char::from(format.quote),
        has_header = format.has_header,
        "detected input format"
    );

    Ok(format)
}

/// Open `path`, positioned past a UTF-8 byte-order mark if one is present.
pub(crate) fn open_after_bom(path: &Path) -> Result<BufReader<File>> {
    let mut file = File::open(path).map_err(|err| EtlError::FormatDetection {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut bom = [0u8; 3];
    let mut read = 0;
    while read < bom.len() {
        let n = file.read(&mut bom[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    if !(read == 3 && bom == [0xEF, 0xBB, 0xBF]) {
        file.seek(SeekFrom::Start(0))?;
    }

    Ok(BufReader::new(file))
}

/// Statistical fallback: pick the candidate delimiter that appears a
/// consistent, non-zero number of times per sampled line, then judge header
/// presence by type homogeneity of the first row versus the rest.
fn sniff(sample: &str, path: &Path) -> Result<CsvFormat> {
    let lines: Vec<&str> = sample
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();

    let delimiter = pick_delimiter(&lines).ok_or_else(|| EtlError::FormatDetection {
        path: path.to_path_buf(),
        reason: "no candidate delimiter found in sample".to_string(),
    })?;

    // Double quote unless the sample only ever quotes with apostrophes.
    let quote = if !sample.contains('"') && sample.contains('\'') {
        b'\''
    } else {
        b'"'
    };

    Ok(CsvFormat {
        delimiter,
        quote,
        has_header: infer_header(&lines, delimiter),
    })
}

fn pick_delimiter(lines: &[&str]) -> Option<u8> {
    let count = |line: &str, delim: u8| line.bytes().filter(|&b| b == delim).count();

    // First pass: a delimiter appearing the same non-zero number of times on
    // every sampled line. Among those, more columns wins.
    let mut best: Option<(u8, usize)> = None;
    for &delim in CANDIDATE_DELIMITERS {
        let first = count(lines[0], delim);
        if first == 0 {
            continue;
        }
        if lines.iter().all(|line| count(line, delim) == first) {
            match best {
                Some((_, n)) if n >= first => {},
                _ => best = Some((delim, first)),
            }
        }
    }
    if let Some((delim, _)) = best {
        return Some(delim);
    }

    // Fallback: the candidate with the most total occurrences.
    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|delim| (delim, lines.iter().map(|line| count(line, delim)).sum::<usize>()))
        .filter(|&(_, total)| total > 0)
        .max_by_key(|&(_, total)| total)
        .map(|(delim, _)| delim)
}

/// Vote per column: where the body rows are homogeneously numeric, a
/// non-numeric first-row cell argues for a header, a numeric one against.
/// Ties assume a header, which downstream validation requires anyway.
fn infer_header(lines: &[&str], delimiter: u8) -> bool {
    if lines.len() < 2 {
        return true;
    }

    let split = |line: &str| -> Vec<String> {
        line.split(char::from(delimiter))
            .map(|cell| cell.trim().trim_matches('"').to_string())
            .collect()
    };
    let numeric = |cell: &str| !cell.is_empty() && cell.parse::<f64>().is_ok();

    let header = split(lines[0]);
    let body: Vec<Vec<String>> = lines[1..].iter().map(|line| split(line)).collect();

    let mut votes = 0i32;
    for (idx, cell) in header.iter().enumerate() {
        let column: Vec<&str> = body
            .iter()
            .filter_map(|row| row.get(idx))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .collect();
        if column.is_empty() || !column.iter().all(|value| numeric(value)) {
            continue;
        }
        if numeric(cell) {
            votes -= 1;
        } else {
            votes += 1;
        }
    }

    votes >= 0
}
