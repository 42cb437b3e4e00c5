//! CSV records over in-memory input and into byte buffers.

use std::io::Cursor;
use std::os::raw::c_int;

use csv::{ByteRecord, ErrorKind, ReaderBuilder, WriterBuilder};
use parking_lot::Mutex;

use crate::buffer::BufferSink;
use crate::error::{Error, Result};
use crate::ffi::{
    self, contract, raw, FatBytes, FatBytesBuffer, FatCsvReader, FatCsvWriter, FatError, FatString,
    FatStringArray,
};
use crate::string::TextArray;
use crate::types::Status;

/// Reads comma-separated records. Every record must have the field count
/// of the first one.
pub struct RecordReader {
    data: Vec<u8>,
    inner: csv::Reader<Cursor<Vec<u8>>>,
    record: ByteRecord,
    /// Byte offset where the last record starts.
    record_start: Option<usize>,
}

impl RecordReader {
    pub fn new(data: Vec<u8>) -> Self {
        let inner = ReaderBuilder::new()
            .has_headers(false)
            .flexible(false)
            .from_reader(Cursor::new(data.clone()));
        Self {
            data,
            inner,
            record: ByteRecord::new(),
            record_start: None,
        }
    }

    /// Read the next record. `Ok(None)` at end of input.
    pub fn read(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        match self.inner.read_byte_record(&mut self.record) {
            Ok(false) => Ok(None),
            Ok(true) => {
                self.record_start = self.record.position().map(|p| p.byte() as usize);
                Ok(Some(self.record.iter().map(<[u8]>::to_vec).collect()))
            }
            Err(e) => Err(read_error(e)),
        }
    }

    /// Byte offset just past the last record read.
    pub fn input_offset(&self) -> i64 {
        self.inner.position().byte() as i64
    }

    /// 1-based line and byte column where `field` of the last record
    /// starts, or `None` if there is no such field.
    pub fn field_pos(&self, field: usize) -> Option<(usize, usize)> {
        let start = self.record_start?;
        if field >= self.record.len() {
            return None;
        }
        let starts = field_starts(&self.data[start..]);
        let at = start + *starts.get(field)?;
        let before = &self.data[..at];
        let line = 1 + before.iter().filter(|&&c| c == b'\n').count();
        let line_start = before.iter().rposition(|&c| c == b'\n').map_or(0, |i| i + 1);
        Some((line, at - line_start + 1))
    }
}

/// Relative offsets of each field start within one raw record.
fn field_starts(raw: &[u8]) -> Vec<usize> {
    let mut starts = vec![0];
    let mut i = 0;
    let mut in_quotes = false;
    let mut at_field_start = true;
    while i < raw.len() {
        let c = raw[i];
        if in_quotes {
            if c == b'"' {
                if raw.get(i + 1) == Some(&b'"') {
                    i += 1;
                } else {
                    in_quotes = false;
                }
            }
        } else {
            match c {
                b'"' if at_field_start => in_quotes = true,
                b',' => {
                    starts.push(i + 1);
                    at_field_start = true;
                    i += 1;
                    continue;
                }
                b'\n' | b'\r' => break,
                _ => {}
            }
        }
        at_field_start = false;
        i += 1;
    }
    starts
}

fn read_error(err: csv::Error) -> Error {
    let line = err.position().map(|p| p.line());
    match err.into_kind() {
        ErrorKind::Io(e) => Error::Io(e),
        ErrorKind::UnequalLengths { pos, .. } => {
            let line = pos.map(|p| p.line()).or(line).unwrap_or(0);
            Error::syntax(format!("record on line {}: wrong number of fields", line))
        }
        other => Error::syntax(format!("{:?}", other)),
    }
}

/// Writes records into a byte buffer, buffering until flushed.
pub struct RecordWriter {
    inner: csv::Writer<BufferSink>,
    error: Option<String>,
}

impl RecordWriter {
    pub fn new(sink: BufferSink) -> Self {
        Self {
            inner: WriterBuilder::new().from_writer(sink),
            error: None,
        }
    }

    pub fn write_record<I, T>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.inner.write_record(fields).map_err(|e| {
            let err = Error::other(e.to_string());
            self.error.get_or_insert_with(|| err.to_string());
            err
        })
    }

    pub fn flush(&mut self) {
        if let Err(e) = self.inner.flush() {
            self.error.get_or_insert_with(|| e.to_string());
        }
    }

    /// First error seen by a write or flush.
    pub fn error(&self) -> Result<()> {
        match &self.error {
            Some(msg) => Err(Error::other(msg.clone())),
            None => Ok(()),
        }
    }
}

/// Creates a reader over a copy of `b`.
#[no_mangle]
pub extern "C" fn fat_CsvReaderNewBytes(b: FatBytes) -> FatCsvReader {
    let data = b.resolve("fat_CsvReaderNewBytes").as_slice().to_vec();
    FatCsvReader::register(Mutex::new(RecordReader::new(data)))
}

/// Releases the reader.
#[no_mangle]
pub extern "C" fn fat_CsvReaderFree(r: FatCsvReader) {
    r.release("fat_CsvReaderFree");
}

/// Reads the next record as a string array. At end of input sets
/// `*out_eof`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_CsvReaderRead(
    r: FatCsvReader,
    out_record: *mut FatStringArray,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_CsvReaderRead";
    let out_err = ffi::out_err(OP, out_err);
    let out_record = raw::out(OP, out_record, "out_record");
    let out_eof = raw::out(OP, out_eof, "out_eof");
    *out_record = FatStringArray::invalid();
    *out_eof = false;
    let result = r.resolve(OP).lock().read();
    ffi::complete(OP, out_err, result, |record| match record {
        Some(fields) => *out_record = FatStringArray::register(TextArray::new(fields)),
        None => *out_eof = true,
    })
}

/// Position of a field of the last record read. A field index outside
/// that record is fatal.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_CsvReaderFieldPos(
    r: FatCsvReader,
    field: c_int,
    out_line: *mut c_int,
    out_col: *mut c_int,
) {
    const OP: &str = "fat_CsvReaderFieldPos";
    let out_line = raw::out(OP, out_line, "out_line");
    let out_col = raw::out(OP, out_col, "out_col");
    let idx = contract::index(OP, field as isize, "field");
    let Some((line, col)) = r.resolve(OP).lock().field_pos(idx) else {
        contract::violation(OP, format_args!("field {} out of range", idx));
    };
    *out_line = line as c_int;
    *out_col = col as c_int;
}

/// Byte offset just past the last record read.
#[no_mangle]
pub extern "C" fn fat_CsvReaderInputOffset(r: FatCsvReader) -> i64 {
    r.resolve("fat_CsvReaderInputOffset").lock().input_offset()
}

/// Creates a writer that appends records to `dst`.
#[no_mangle]
pub extern "C" fn fat_CsvWriterNewToBytesBuffer(dst: FatBytesBuffer) -> FatCsvWriter {
    let sink = BufferSink::resolve(dst, "fat_CsvWriterNewToBytesBuffer");
    FatCsvWriter::register(Mutex::new(RecordWriter::new(sink)))
}

/// Writes one record of `n` string handles.
///
/// # Safety
///
/// `fields` must point to `n` handles (NULL only if `n == 0`); `out_err`
/// must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_CsvWriterWriteRecord(
    w: FatCsvWriter,
    fields: *const FatString,
    n: usize,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_CsvWriterWriteRecord";
    let out_err = ffi::out_err(OP, out_err);
    let texts: Vec<_> = raw::array(OP, fields, n).iter().map(|f| f.resolve(OP)).collect();
    let result = w.resolve(OP).lock().write_record(texts.iter().map(|t| t.as_bytes()));
    ffi::complete(OP, out_err, result, |()| ())
}

/// Writes buffered records to the destination buffer.
#[no_mangle]
pub extern "C" fn fat_CsvWriterFlush(w: FatCsvWriter) {
    w.resolve("fat_CsvWriterFlush").lock().flush();
}

/// Reports the first error from an earlier write or flush.
///
/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_CsvWriterError(w: FatCsvWriter, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_CsvWriterError";
    let out_err = ffi::out_err(OP, out_err);
    let result = w.resolve(OP).lock().error();
    ffi::complete(OP, out_err, result, |()| ())
}

/// Releases the writer without flushing.
#[no_mangle]
pub extern "C" fn fat_CsvWriterFree(w: FatCsvWriter) {
    w.release("fat_CsvWriterFree");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use std::sync::Arc;

    fn strs(rec: &[Vec<u8>]) -> Vec<&str> {
        rec.iter().map(|f| std::str::from_utf8(f).unwrap()).collect()
    }

    #[test]
    fn test_reads_quoted_records() {
        let mut r = RecordReader::new(b"a,\"b,c\",d\n1,\"x\"\"y\",3\n".to_vec());
        assert_eq!(strs(&r.read().unwrap().unwrap()), ["a", "b,c", "d"]);
        assert_eq!(strs(&r.read().unwrap().unwrap()), ["1", "x\"y", "3"]);
        assert!(r.read().unwrap().is_none());
    }

    #[test]
    fn test_field_count_mismatch() {
        let mut r = RecordReader::new(b"a,b\nc\n".to_vec());
        r.read().unwrap();
        let err = r.read().unwrap_err();
        assert_eq!(err.status(), Status::Syntax);
        assert!(err.to_string().contains("wrong number of fields"));
    }

    #[test]
    fn test_field_pos_and_offset() {
        let mut r = RecordReader::new(b"a,b\nxx,\"y\"\n".to_vec());
        r.read().unwrap();
        assert_eq!(r.input_offset(), 4);
        r.read().unwrap();
        assert_eq!(r.field_pos(0), Some((2, 1)));
        assert_eq!(r.field_pos(1), Some((2, 4)));
        assert_eq!(r.field_pos(2), None);
    }

    #[test]
    fn test_writer_quotes_when_needed() {
        let buf = Arc::new(Mutex::new(Buffer::default()));
        let mut w = RecordWriter::new(BufferSink::new(Arc::clone(&buf)));
        w.write_record(["a", "b,c"]).unwrap();
        w.write_record(["q\"x", "1"]).unwrap();
        assert!(buf.lock().unread().is_empty());
        w.flush();
        assert!(w.error().is_ok());
        assert_eq!(buf.lock().unread(), b"a,\"b,c\"\n\"q\"\"x\",1\n");
    }
}
