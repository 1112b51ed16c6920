use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{LikelihoodTreeError, Result};
use crate::stats::PatternRow;

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Open a file for reading, transparently decompressing `.gz` files.
fn open_input(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let f = File::open(path)?;
    if is_gz(path) {
        Ok(Box::new(BufReader::new(GzDecoder::new(f))))
    } else {
        Ok(Box::new(BufReader::new(f)))
    }
}

/// Buffered TSV output, gzip-compressed when the path ends with `.gz`.
enum Output {
    Plain(BufWriter<File>),
    Gz(BufWriter<GzEncoder<File>>),
}

impl Output {
    /// Writing to stdout (`-`) is not supported.
    fn create(path: &Path) -> io::Result<Self> {
        if path.as_os_str() == "-" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "writing to stdout is not supported",
            ));
        }
        let f = File::create(path)?;
        if is_gz(path) {
            Ok(Output::Gz(BufWriter::new(GzEncoder::new(f, Compression::default()))))
        } else {
            Ok(Output::Plain(BufWriter::new(f)))
        }
    }

    /// Flush buffered rows and, for gzip, write the stream trailer.
    fn finish(self) -> io::Result<()> {
        match self {
            Output::Plain(mut w) => w.flush(),
            Output::Gz(w) => {
                let encoder = w.into_inner().map_err(|e| e.into_error())?;
                encoder.finish()?.sync_all()
            }
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Plain(w) => w.write(buf),
            Output::Gz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(w) => w.flush(),
            Output::Gz(w) => w.flush(),
        }
    }
}

/// Read a Newick tree string (plain or `.gz`).
pub fn read_newick<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut content = String::new();
    open_input(path.as_ref())?.read_to_string(&mut content)?;
    let newick = content.trim();
    if newick.is_empty() {
        return Err(LikelihoodTreeError::Newick(format!(
            "{} is empty",
            path.as_ref().display()
        )));
    }
    Ok(newick.to_string())
}

/// Read aligned sequences from a FASTA file (plain or `.gz`), in file order.
///
/// The name of a record is the first whitespace-separated token of its
/// header. Sequence lines are concatenated with surrounding whitespace
/// removed.
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<Vec<(String, String)>> {
    parse_fasta(open_input(path.as_ref())?)
}

fn parse_fasta<R: BufRead>(reader: R) -> Result<Vec<(String, String)>> {
    let mut records: Vec<(String, String)> = Vec::new();
    let mut seen = HashSet::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            let name = header.split_whitespace().next().unwrap_or("").to_string();
            if name.is_empty() {
                return Err(LikelihoodTreeError::Parse {
                    line: line_no,
                    message: "record without a name".into(),
                });
            }
            if !seen.insert(name.clone()) {
                return Err(LikelihoodTreeError::Parse {
                    line: line_no,
                    message: format!("duplicate record '{name}'"),
                });
            }
            records.push((name, String::new()));
        } else {
            match records.last_mut() {
                Some((_, seq)) => seq.extend(line.split_whitespace()),
                None => {
                    return Err(LikelihoodTreeError::Parse {
                        line: line_no,
                        message: "sequence data before the first header".into(),
                    })
                }
            }
        }
    }
    Ok(records)
}

/// Write (pattern, count) rows as TSV.
pub fn write_pattern_counts_tsv<P: AsRef<Path>>(path: P, rows: &[(String, f64)]) -> io::Result<()> {
    let mut out = Output::create(path.as_ref())?;
    writeln!(&mut out, "pattern\tcount")?;
    for (pattern, count) in rows {
        writeln!(&mut out, "{pattern}\t{count}")?;
    }
    out.finish()
}

/// Write a G-statistic observed/expected table as TSV.
pub fn write_g_table_tsv<P: AsRef<Path>>(path: P, rows: &[PatternRow]) -> io::Result<()> {
    let mut out = Output::create(path.as_ref())?;
    writeln!(&mut out, "pattern\tobserved\texpected")?;
    for row in rows {
        writeln!(&mut out, "{}\t{}\t{}", row.pattern, row.observed, row.expected)?;
    }
    out.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("likelihood-tree-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_parse_fasta_multiline() {
        let text = ">a first record\nAC GT\nAA\n\n>b\nTTTTAA\n";
        let records = parse_fasta(text.as_bytes()).unwrap();
        assert_eq!(
            records,
            vec![
                ("a".to_string(), "ACGTAA".to_string()),
                ("b".to_string(), "TTTTAA".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_fasta_errors() {
        let err = parse_fasta("ACGT\n>a\nAC\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LikelihoodTreeError::Parse { line: 1, .. }));

        let err = parse_fasta(">a\nAC\n>a\nAC\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LikelihoodTreeError::Parse { line: 3, .. }));

        let err = parse_fasta(">\nAC\n".as_bytes()).unwrap_err();
        assert!(matches!(err, LikelihoodTreeError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_read_gzipped_fasta() {
        let path = temp_path("aln.fasta.gz");
        {
            let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
            enc.write_all(b">x\nACGT\n>y\nACGA\n").unwrap();
            enc.finish().unwrap();
        }
        let records = read_fasta(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], ("y".to_string(), "ACGA".to_string()));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_newick_trims() {
        let path = temp_path("tree.nwk");
        std::fs::write(&path, "  (a,b);\n").unwrap();
        assert_eq!(read_newick(&path).unwrap(), "(a,b);");
        std::fs::write(&path, "\n").unwrap();
        assert!(matches!(read_newick(&path), Err(LikelihoodTreeError::Newick(_))));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_tables() {
        let path = temp_path("counts.tsv");
        write_pattern_counts_tsv(&path, &[("AA".to_string(), 4.0), ("CT".to_string(), 1.0)])
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "pattern\tcount\nAA\t4\nCT\t1\n");
        std::fs::remove_file(&path).unwrap();

        let path = temp_path("g.tsv.gz");
        let rows = vec![PatternRow {
            pattern: "AA".into(),
            observed: 3,
            expected: 2.5,
        }];
        write_g_table_tsv(&path, &rows).unwrap();
        let mut text = String::new();
        open_input(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "pattern\tobserved\texpected\nAA\t3\t2.5\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_stdout_rejected() {
        let err = write_pattern_counts_tsv("-", &[]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_gz_output_has_trailer() {
        let path = temp_path("trailer.tsv.gz");
        let rows: Vec<(String, f64)> = (0..500).map(|i| (format!("P{i}"), i as f64)).collect();
        write_pattern_counts_tsv(&path, &rows).unwrap();

        let mut text = String::new();
        open_input(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text.lines().count(), 501);

        // gzip ISIZE: uncompressed length mod 2^32, little-endian, last 4 bytes
        let raw = std::fs::read(&path).unwrap();
        let trailer_len = u32::from_le_bytes(raw[raw.len() - 4..].try_into().unwrap());
        assert_eq!(trailer_len as usize, text.len());
        std::fs::remove_file(&path).unwrap();
    }
}
