use std::io::{BufRead, Write};

use crate::error::{MapError, Result};

/// 批处理驱动读取查询的行来源。
pub trait LineReader: Send {
    /// 返回下一行（不含换行符），流结束时返回 `None`。
    fn read_line(&mut self) -> Result<Option<String>>;
}

/// 批处理驱动写出结果的行去向。
pub trait LineWriter: Send {
    fn write_line(&mut self, line: &str) -> std::io::Result<()>;

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 按字节读取的文本行；非 UTF-8 的行以 `InputSyntax` 报告，带行号和内容。
pub struct TextLineReader<R: BufRead> {
    inner: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl<R: BufRead> TextLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            line_no: 0,
        }
    }
}

impl<R: BufRead + Send> LineReader for TextLineReader<R> {
    fn read_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let end = self
            .buf
            .iter()
            .rposition(|&b| b != b'\n' && b != b'\r')
            .map_or(0, |i| i + 1);
        self.buf.truncate(end);
        match String::from_utf8(std::mem::take(&mut self.buf)) {
            Ok(line) => Ok(Some(line)),
            Err(e) => Err(MapError::InputSyntax {
                line: self.line_no,
                content: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                reason: "line is not valid UTF-8".to_string(),
            }),
        }
    }
}

pub struct TextLineWriter<W: Write> {
    inner: W,
}

impl<W: Write> TextLineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> LineWriter for TextLineWriter<W> {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// 内存中的结果行，测试和需要二次处理结果的调用方使用
#[derive(Debug, Default)]
pub struct VecLineWriter {
    pub lines: Vec<String>,
}

impl LineWriter for VecLineWriter {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reader_strips_terminators() {
        let mut r = TextLineReader::new(Cursor::new("PEPTIDE\r\nTAG,12.5,K\n\nLAST"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("PEPTIDE"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("TAG,12.5,K"));
        assert_eq!(r.read_line().unwrap().as_deref(), Some(""));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("LAST"));
        assert_eq!(r.read_line().unwrap(), None);
    }

    #[test]
    fn invalid_utf8_reports_line_and_content() {
        let mut r = TextLineReader::new(Cursor::new(&b"TAY\nPEP\xffTIDE\r\nIAK\n"[..]));
        assert_eq!(r.read_line().unwrap().as_deref(), Some("TAY"));
        match r.read_line() {
            Err(MapError::InputSyntax { line, content, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(content, "PEP\u{fffd}TIDE");
            }
            other => panic!("expected InputSyntax, got {:?}", other),
        }
        // 坏行之后仍可继续读取
        assert_eq!(r.read_line().unwrap().as_deref(), Some("IAK"));
    }

    #[test]
    fn writer_appends_newlines() {
        let mut w = TextLineWriter::new(Vec::new());
        w.write_line("a,b").unwrap();
        w.write_line("c").unwrap();
        assert_eq!(w.into_inner(), b"a,b\nc\n");
    }
}
