use std::io::BufRead;

use crate::error::{MapError, Result};

#[derive(Debug, Clone)]
pub struct ProteinRecord {
    /// 从标题行解析出的 accession（`sp|P12345|NAME_HUMAN` → `P12345`）
    pub accession: String,
    /// 标题行第一个空白之后的部分
    pub desc: Option<String>,
    /// 大写残基，去掉末尾的 `*` 终止符
    pub seq: Vec<u8>,
}

/// 蛋白 FASTA 流式读取器
pub struct FastaReader<R: BufRead> {
    reader: R,
    buf: String,
    line_no: usize,
    done: bool,
    peek_header: Option<String>,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line_no: 0,
            done: false,
            peek_header: None,
        }
    }

    fn next_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let n = self.reader.read_line(&mut self.buf)?;
        if n > 0 {
            self.line_no += 1;
        }
        Ok(n > 0)
    }

    pub fn next_record(&mut self) -> Result<Option<ProteinRecord>> {
        if self.done {
            return Ok(None);
        }

        let header = match self.peek_header.take() {
            Some(h) => h,
            None => loop {
                if !self.next_line()? {
                    self.done = true;
                    return Ok(None);
                }
                if let Some(h) = self.buf.strip_prefix('>') {
                    break h.trim().to_string();
                }
                if !self.buf.trim().is_empty() {
                    return Err(MapError::Corpus(format!(
                        "line {}: sequence data before the first FASTA header",
                        self.line_no
                    )));
                }
            },
        };

        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("");
        let accession = parse_accession(id);
        if accession.is_empty() {
            return Err(MapError::Corpus(format!("line {}: FASTA header without accession", self.line_no)));
        }
        let desc = parts
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let mut seq: Vec<u8> = Vec::new();
        loop {
            if !self.next_line()? {
                self.done = true;
                break;
            }
            if let Some(h) = self.buf.strip_prefix('>') {
                self.peek_header = Some(h.trim().to_string());
                break;
            }
            for &b in self.buf.as_bytes() {
                match b {
                    b'\n' | b'\r' | b' ' | b'\t' | b'*' => {}
                    b if b.is_ascii_alphabetic() => seq.push(b.to_ascii_uppercase()),
                    other => {
                        return Err(MapError::Corpus(format!(
                            "line {}: invalid residue '{}' in protein {}",
                            self.line_no, other as char, accession
                        )))
                    }
                }
            }
        }

        Ok(Some(ProteinRecord { accession, desc, seq }))
    }
}

/// UniProt 风格的 `db|ACC|NAME` 取中间段，其余情况保留整个标识符。
pub fn parse_accession(id: &str) -> String {
    let mut fields = id.split('|');
    match (fields.next(), fields.next()) {
        (Some(db), Some(acc)) if !db.is_empty() && !acc.is_empty() => acc.to_string(),
        _ => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_uniprot_fasta() {
        let data = b">sp|P12345|TEST_HUMAN Test protein OS=Homo sapiens\nMKTa\nYIAK*\n>tr|Q9XYZ1|OTHER\nPEPTIDE\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.accession, "P12345");
        assert_eq!(r1.desc.as_deref(), Some("Test protein OS=Homo sapiens"));
        assert_eq!(r1.seq, b"MKTAYIAK");

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.accession, "Q9XYZ1");
        assert_eq!(r2.desc, None);
        assert_eq!(r2.seq, b"PEPTIDE");

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn plain_identifiers_are_kept_whole() {
        assert_eq!(parse_accession("PROT_1"), "PROT_1");
        assert_eq!(parse_accession("|weird"), "|weird");
    }

    #[test]
    fn crlf_and_blank_leading_lines() {
        let data = b"\r\n\n>p1\r\nAC D\r\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));
        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.accession, "p1");
        assert_eq!(r1.seq, b"ACD");
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn rejects_non_residue_characters() {
        let data = b">p1\nAC1D\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));
        assert!(matches!(r.next_record(), Err(MapError::Corpus(_))));
    }
}
