//! Line codec for accumulator files
//!
//! One record per line: `count\tnamespace\ttitle\n`. The final output file
//! uses the same format.

use std::io::{BufRead, Write};

use crate::error::DumpError;
use crate::record::{Key, Record};

/// Initial capacity for the per-line read buffer
const LINE_BUF_CAPACITY: usize = 256;

/// Write one record as a terminated line.
///
/// Titles are assumed to be free of TAB and newline characters.
pub fn encode_record<W: Write>(record: &Record, out: &mut W) -> std::io::Result<()> {
    writeln!(
        out,
        "{}\t{}\t{}",
        record.count, record.key.namespace, record.key.title
    )
}

/// Parse one line (terminator already stripped).
///
/// Splits on the first two TABs only, so anything after the second TAB is
/// the title.
pub fn decode_line(line: &str) -> Result<Record, DumpError> {
    let malformed = |reason| DumpError::MalformedRecord {
        line: line.to_string(),
        reason,
    };

    let mut fields = line.splitn(3, '\t');
    let (Some(count), Some(namespace), Some(title)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed("expected 3 fields"));
    };

    let count = count
        .trim()
        .parse::<u64>()
        .map_err(|_| malformed("count is not a non-negative integer"))?;
    let namespace = namespace
        .trim()
        .parse::<i32>()
        .map_err(|_| malformed("namespace is not an integer"))?;

    Ok(Record {
        key: Key::new(namespace, title),
        count,
    })
}

/// Streaming reader over an accumulator file.
pub struct AccumulatorReader<R> {
    inner: R,
    buf: String,
    lines_read: usize,
}

impl<R: BufRead> AccumulatorReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: String::with_capacity(LINE_BUF_CAPACITY),
            lines_read: 0,
        }
    }

    /// Next record, or `Ok(None)` on a clean end-of-stream.
    ///
    /// A last line without a terminator means the file was cut short and is
    /// reported as [`DumpError::StreamRead`], never as end-of-stream.
    pub fn next_record(&mut self) -> Result<Option<Record>, DumpError> {
        self.buf.clear();
        let n = self
            .inner
            .read_line(&mut self.buf)
            .map_err(DumpError::StreamRead)?;
        if n == 0 {
            return Ok(None);
        }
        self.lines_read += 1;

        let Some(line) = self.buf.strip_suffix('\n') else {
            return Err(DumpError::StreamRead(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("unterminated line {} in intermediate file", self.lines_read),
            )));
        };
        let line = line.strip_suffix('\r').unwrap_or(line);
        decode_line(line).map(Some)
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }
}

/// Streaming writer for a new accumulator version.
pub struct AccumulatorWriter<W: Write> {
    inner: W,
    written: usize,
}

impl<W: Write> AccumulatorWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn write(&mut self, record: &Record) -> std::io::Result<()> {
        encode_record(record, &mut self.inner)?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush buffered lines and hand back the underlying writer.
    pub fn finish(mut self) -> std::io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
