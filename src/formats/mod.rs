//! Input formats and format sniffing.
//!
//! Supports automatic format detection for:
//! - FASTA sequences (.fasta, .fa, .fna, .faa, .fas, .seq)
//! - MEME motifs: plain text, HTML, MEME XML and DREME XML (.meme, .txt, .html, .xml)
//! - Markov background models (.bg, .bfile, .bkg)
//!
//! Format detection priority:
//! 1. Explicit format choice (-f option)
//! 2. File extension
//! 3. Content-based detection
//!
//! Independently of the format, [`unusable_format`] looks at the first bytes
//! of a file for magic numbers and byte patterns that show it is not plain
//! text at all (a Word document, a gzip archive, UTF-16 text, ...).

pub mod background;
pub mod fasta;
pub mod fasta_summary;

use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Bytes read from the start of a file to sniff its format.
const SNIFF_SIZE: u64 = 4096;

/// Detected file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Fasta,
    Motif,
    Background,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Fasta => write!(f, "FASTA"),
            FileFormat::Motif => write!(f, "motif"),
            FileFormat::Background => write!(f, "background"),
        }
    }
}

/// Detects format from file extension.
pub fn detect_format_from_extension<P: AsRef<Path>>(path: P) -> Option<FileFormat> {
    let ext = path.as_ref().extension().and_then(OsStr::to_str)?;
    match ext.to_lowercase().as_str() {
        "fa" | "fas" | "fasta" | "fna" | "faa" | "ffn" | "frn" | "seq" => Some(FileFormat::Fasta),
        "meme" | "dreme" | "txt" | "html" | "htm" | "xml" => Some(FileFormat::Motif),
        "bg" | "bfile" | "bkg" => Some(FileFormat::Background),
        _ => None,
    }
}

/// Detects the file format by examining the first non-empty line.
pub fn detect_format_from_content(content: &str) -> Option<FileFormat> {
    let trimmed = content.lines().map(str::trim).find(|line| !line.is_empty())?;
    if trimmed.starts_with('>') || trimmed.starts_with(';') {
        return Some(FileFormat::Fasta);
    }
    if trimmed.starts_with('#') {
        return Some(FileFormat::Background);
    }
    // background: "<chain> <probability>"
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() == 2
        && parts[0].chars().all(|c| c.is_ascii_alphabetic())
        && parts[1].parse::<f64>().is_ok()
    {
        return Some(FileFormat::Background);
    }
    if trimmed.starts_with('<') || trimmed.starts_with("MEME") || trimmed.starts_with("MOTIF") {
        return Some(FileFormat::Motif);
    }
    None
}

/// Detects the format of a file on disk.
///
/// The extension wins; otherwise the first few kilobytes are examined.
/// Files that look like nothing in particular are treated as motifs, which
/// is the most forgiving checker.
pub fn detect_format<P: AsRef<Path>>(path: P) -> io::Result<FileFormat> {
    let path = path.as_ref();
    if let Some(format) = detect_format_from_extension(path) {
        return Ok(format);
    }
    let mut head = Vec::new();
    File::open(path)?.take(SNIFF_SIZE).read_to_end(&mut head)?;
    let format = detect_format_from_content(&String::from_utf8_lossy(&head)).unwrap_or(FileFormat::Motif);
    log::debug!("Detected {} format from the content of {}", format, path.display());
    Ok(format)
}

/// Why a file cannot be read as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Text in an encoding other than plain UTF-8.
    Encoding,
    Binary,
    Compressed,
}

/// A recognised non-text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnusableFormat {
    pub name: &'static str,
    pub kind: FileKind,
}

impl UnusableFormat {
    const fn new(name: &'static str, kind: FileKind) -> Self {
        Self { name, kind }
    }
}

const UTF16: UnusableFormat = UnusableFormat::new("UTF-16", FileKind::Encoding);
const UTF32: UnusableFormat = UnusableFormat::new("UTF-32", FileKind::Encoding);
const WORD: UnusableFormat = UnusableFormat::new("Microsoft Word document", FileKind::Binary);
const POWERPOINT: UnusableFormat =
    UnusableFormat::new("Microsoft PowerPoint presentation", FileKind::Binary);
const EXCEL: UnusableFormat = UnusableFormat::new("Microsoft Excel spreadsheet", FileKind::Binary);

/// Checks the start of a file for signs that it is not plain text.
///
/// `max_scan` limits the NUL byte scan (at least 4 bytes, at most the chunk);
/// `None` scans the whole chunk. The file name's extension disambiguates
/// some container formats.
pub fn unusable_format(chunk: &[u8], max_scan: Option<usize>, file_name: Option<&str>) -> Option<UnusableFormat> {
    let max_scan = max_scan.unwrap_or(chunk.len()).max(4).min(chunk.len());
    let extension = file_name
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext))
        .unwrap_or("")
        .to_ascii_uppercase();

    if chunk.starts_with(&[0xFE, 0xFF]) {
        return Some(UTF16);
    }
    if chunk.starts_with(&[0xFF, 0xFE]) && (chunk.len() < 4 || chunk[2] != 0 || chunk[3] != 0) {
        return Some(UTF16);
    }
    if chunk.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(UnusableFormat::new("UTF-8 with a byte order mark", FileKind::Encoding));
    }
    if chunk.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) || chunk.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return Some(UTF32);
    }
    if chunk.starts_with(b"{\\rtf1") {
        return Some(UnusableFormat::new("rich text", FileKind::Binary));
    }
    // legacy compound document: doc, ppt, xls
    if chunk.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        if chunk.len() > 520 {
            let sub = &chunk[512..520];
            if sub.starts_with(&[0xEC, 0xA5, 0xC1, 0x00]) {
                return Some(WORD);
            }
            let powerpoint: [&[u8]; 6] = [
                &[0x00, 0x6E, 0x1E, 0xF0],
                &[0x0F, 0x00, 0xE8, 0x03],
                &[0xA0, 0x46, 0x1D, 0xF0],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x0E, 0x00, 0x00, 0x00],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x1C, 0x00, 0x00, 0x00],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x43, 0x00, 0x00, 0x00],
            ];
            if extension == "PPT" || powerpoint.iter().any(|sig| sub.starts_with(sig)) {
                return Some(POWERPOINT);
            }
            let excel: [&[u8]; 7] = [
                &[0x09, 0x08, 0x10, 0x00, 0x00, 0x06, 0x05, 0x00],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x10],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x1F],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x22],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x23],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x28],
                &[0xFD, 0xFF, 0xFF, 0xFF, 0x29],
            ];
            if extension == "XLS" || excel.iter().any(|sig| sub.starts_with(sig)) {
                return Some(EXCEL);
            }
        }
        return Some(UnusableFormat::new("Microsoft Office document", FileKind::Binary));
    }
    // any zip; the extension says which office format it is
    if chunk.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        match extension.as_str() {
            "DOCX" => return Some(WORD),
            "PPTX" => return Some(POWERPOINT),
            "XLSX" => return Some(EXCEL),
            "ZIP" => return Some(UnusableFormat::new("ZIP archive", FileKind::Compressed)),
            _ => {}
        }
    }
    if chunk.starts_with(&[0x1F, 0x8B, 0x08]) {
        return Some(UnusableFormat::new("GZIP archive", FileKind::Compressed));
    }
    if chunk.starts_with(b"%PDF") && extension == "PDF" {
        return Some(UnusableFormat::new("Adobe PDF", FileKind::Binary));
    }

    // no magic number; text should contain no NUL bytes, and where they
    // fall in each group of four tells wide encodings from binary junk
    let mut nulls = [0usize; 4];
    for (i, byte) in chunk[..max_scan].iter().enumerate() {
        if *byte == 0 {
            nulls[i % 4] += 1;
        }
    }
    if nulls.iter().sum::<usize>() == 0 {
        return None;
    }
    let [n0, n1, n2, n3] = nulls;
    if n0 != 0 && n1 != 0 && n2 != 0 && n3 == 0 {
        Some(UTF32)
    } else if n0 == 0 && n1 != 0 && n2 != 0 && n3 != 0 {
        Some(UTF32)
    } else if n0 + n2 != 0 && n1 + n3 == 0 {
        Some(UTF16)
    } else if n0 + n2 == 0 && n1 + n3 != 0 {
        Some(UTF16)
    } else {
        Some(UnusableFormat::new("unknown binary", FileKind::Binary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_fasta() {
        let content = ">seq1\nACGT\n";
        assert_eq!(detect_format_from_content(content), Some(FileFormat::Fasta));
    }

    #[test]
    fn test_detect_motif() {
        assert_eq!(detect_format_from_content("MEME version 4\n"), Some(FileFormat::Motif));
        assert_eq!(detect_format_from_content("<?xml version='1.0'?>\n"), Some(FileFormat::Motif));
        assert_eq!(detect_format_from_content("MOTIF m1\n"), Some(FileFormat::Motif));
    }

    #[test]
    fn test_detect_background() {
        assert_eq!(detect_format_from_content("# order 0\nA 0.3\n"), Some(FileFormat::Background));
        assert_eq!(detect_format_from_content("\n  A 0.25\nC 0.25\n"), Some(FileFormat::Background));
    }

    #[test]
    fn test_detect_unknown() {
        let content = "This is not a valid sequence file\n";
        assert_eq!(detect_format_from_content(content), None);
    }

    #[test]
    fn test_detect_from_extension() {
        assert_eq!(detect_format_from_extension("test.fa"), Some(FileFormat::Fasta));
        assert_eq!(detect_format_from_extension("test.FASTA"), Some(FileFormat::Fasta));
        assert_eq!(detect_format_from_extension("meme.html"), Some(FileFormat::Motif));
        assert_eq!(detect_format_from_extension("dreme.xml"), Some(FileFormat::Motif));
        assert_eq!(detect_format_from_extension("model.bfile"), Some(FileFormat::Background));
        assert_eq!(detect_format_from_extension("test.nex"), None);
    }

    #[test]
    fn test_detect_format_of_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let named = dir.path().join("upload.dat");
        let mut file = File::create(&named).unwrap();
        writeln!(file, "# order 0\nA 0.25").unwrap();
        assert_eq!(detect_format(&named).unwrap(), FileFormat::Background);

        let unknown = dir.path().join("notes");
        std::fs::write(&unknown, "nothing to see\n").unwrap();
        assert_eq!(detect_format(&unknown).unwrap(), FileFormat::Motif);

        // the extension is trusted without opening the file
        assert_eq!(detect_format(dir.path().join("missing.fa")).unwrap(), FileFormat::Fasta);
        assert!(detect_format(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_byte_order_marks() {
        assert_eq!(unusable_format(&[0xFE, 0xFF, 0, 0x41], None, None), Some(UTF16));
        assert_eq!(unusable_format(&[0xFF, 0xFE, 0x41, 0], None, None), Some(UTF16));
        assert_eq!(unusable_format(&[0xFF, 0xFE, 0, 0], None, None), Some(UTF32));
        let bom = unusable_format(b"\xEF\xBB\xBF>seq", None, None).unwrap();
        assert_eq!(bom.name, "UTF-8 with a byte order mark");
        assert_eq!(bom.kind, FileKind::Encoding);
    }

    #[test]
    fn test_containers() {
        let gz = unusable_format(&[0x1F, 0x8B, 0x08, 0x00, 0x12], Some(400), Some("seqs.fa.gz")).unwrap();
        assert_eq!(gz.kind, FileKind::Compressed);
        let docx = unusable_format(b"PK\x03\x04rest", None, Some("Report.DOCX")).unwrap();
        assert_eq!(docx, WORD);
        let xlsx = unusable_format(b"PK\x03\x04rest", None, Some("sheet.xlsx")).unwrap();
        assert_eq!(xlsx, EXCEL);
        // an unlabelled zip falls through to the NUL scan
        assert_eq!(unusable_format(b"PK\x03\x04rest", None, Some("x.dat")), None);
        let pdf = unusable_format(b"%PDF-1.4", None, Some("paper.pdf")).unwrap();
        assert_eq!(pdf.name, "Adobe PDF");
        assert_eq!(unusable_format(b"%PDF-1.4", None, Some("notes.txt")), None);
    }

    #[test]
    fn test_compound_document() {
        let mut doc = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        doc.resize(600, 0);
        doc[512..516].copy_from_slice(&[0xEC, 0xA5, 0xC1, 0x00]);
        assert_eq!(unusable_format(&doc, Some(400), None), Some(WORD));
        doc[512..520].copy_from_slice(&[0xFD, 0xFF, 0xFF, 0xFF, 0x1C, 0, 0, 0]);
        assert_eq!(unusable_format(&doc, Some(400), None), Some(POWERPOINT));
        let short = &doc[..100];
        assert_eq!(unusable_format(short, Some(400), None).unwrap().name, "Microsoft Office document");
    }

    #[test]
    fn test_wide_text_without_bom() {
        let utf16le: Vec<u8> = ">seq".bytes().flat_map(|b| [b, 0]).collect();
        assert_eq!(unusable_format(&utf16le, None, None), Some(UTF16));
        let utf32be: Vec<u8> = ">seq".bytes().flat_map(|b| [0, 0, 0, b]).collect();
        assert_eq!(unusable_format(&utf32be, None, None), Some(UTF32));
        let junk = [0, 0, 1, 1, 1, 1, 0, 0];
        assert_eq!(unusable_format(&junk, None, None).unwrap().name, "unknown binary");
        assert_eq!(unusable_format(b">seq\nACGT\n", Some(400), None), None);
    }
}
