//! TAR archive reading and writing.
//!
//! The reader walks 512-byte blocks of an in-memory archive and decodes each
//! header with [`tar::Header`]; GNU long names and PAX `path`/`size`
//! records apply to the entry that follows them. The writer is a
//! [`tar::Builder`] on top of a byte buffer.

use std::os::raw::{c_char, c_void};

use parking_lot::Mutex;
use tar::{Builder, EntryType, Header};

use crate::buffer::BufferSink;
use crate::bytes;
use crate::error::{Error, Result};
use crate::ffi::{
    self, raw, FatBytes, FatBytesBuffer, FatError, FatString, FatTarHeader, FatTarReader,
    FatTarWriter,
};
use crate::string::new_string;
use crate::types::Status;

const BLOCK: usize = 512;
const CHECKSUM: std::ops::Range<usize> = 148..156;

fn header_error() -> Error {
    Error::syntax("archive/tar: invalid tar header")
}

fn padded(size: usize) -> usize {
    size.div_ceil(BLOCK) * BLOCK
}

/// Metadata of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub name: String,
    pub typeflag: u8,
    pub size: i64,
}

/// Sequential reader over an archive held in memory.
pub struct ArchiveReader {
    data: Vec<u8>,
    /// Offset of the next header block.
    next: usize,
    body: std::ops::Range<usize>,
    /// Declared body size ran past the end of the data.
    truncated: bool,
    done: bool,
}

impl ArchiveReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            next: 0,
            body: 0..0,
            truncated: false,
            done: false,
        }
    }

    fn block(&self, at: usize) -> Result<&[u8]> {
        match self.data.get(at..at.saturating_add(BLOCK)) {
            Some(block) => Ok(block),
            None => Err(Error::UnexpectedEof("unexpected EOF".to_string())),
        }
    }

    fn body_of(&self, at: usize, size: usize) -> Result<&[u8]> {
        self.data
            .get(at + BLOCK..at + BLOCK + size)
            .ok_or_else(|| Error::UnexpectedEof("unexpected EOF".to_string()))
    }

    /// Advance to the next entry. `Ok(None)` once the archive ends.
    pub fn next_entry(&mut self) -> Result<Option<EntryHeader>> {
        let mut long_name: Option<String> = None;
        let mut pax_size: Option<u64> = None;
        loop {
            if self.done || self.next == self.data.len() {
                self.done = true;
                self.body = 0..0;
                return Ok(None);
            }
            let at = self.next;
            let block = self.block(at)?;
            if block.iter().all(|&b| b == 0) {
                self.done = true;
                self.body = 0..0;
                return Ok(None);
            }
            verify_checksum(block)?;
            let header = Header::from_byte_slice(block);
            let declared = pax_size
                .take()
                .map_or_else(|| header.entry_size(), Ok)
                .map_err(|_| header_error())?;
            let size = usize::try_from(declared).map_err(|_| header_error())?;
            let kind = header.entry_type();
            let flag = kind.as_byte();

            match kind {
                EntryType::GNULongName => {
                    let name = self.body_of(at, size)?;
                    let name = name.split(|&c| c == 0).next().unwrap_or_default();
                    long_name = Some(String::from_utf8_lossy(name).into_owned());
                    self.next = at + BLOCK + padded(size);
                    continue;
                }
                EntryType::XHeader => {
                    let records = parse_pax(self.body_of(at, size)?)?;
                    for (key, value) in records {
                        match key.as_str() {
                            "path" => long_name = Some(value),
                            "size" => pax_size = Some(value.parse().map_err(|_| header_error())?),
                            _ => {}
                        }
                    }
                    self.next = at + BLOCK + padded(size);
                    continue;
                }
                _ => {}
            }

            let name = match long_name.take() {
                Some(name) => name,
                None => String::from_utf8_lossy(&header.path_bytes()).into_owned(),
            };
            let typeflag = match flag {
                0 if name.ends_with('/') => b'5',
                0 => b'0',
                other => other,
            };
            let start = at + BLOCK;
            let end = start.saturating_add(size);
            self.truncated = end > self.data.len();
            self.body = start.min(self.data.len())..end.min(self.data.len());
            // Left unclamped so a short archive fails the next header read.
            self.next = start.saturating_add(padded(size));
            tracing::trace!(name = %name, typeflag, size, "tar entry");
            return Ok(Some(EntryHeader {
                name,
                typeflag,
                size: size as i64,
            }));
        }
    }

    /// Read from the current entry's body. Returns the byte count and
    /// whether the body is exhausted.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<(usize, bool)> {
        if self.body.is_empty() {
            if self.truncated {
                return Err(Error::UnexpectedEof("unexpected EOF".to_string()));
            }
            return Ok((0, true));
        }
        if dst.is_empty() {
            return Ok((0, false));
        }
        let n = raw::copy_out(&self.data[self.body.clone()], dst);
        self.body.start += n;
        Ok((n, false))
    }
}

fn verify_checksum(block: &[u8]) -> Result<()> {
    let header = Header::from_byte_slice(block);
    let stored = header.cksum().map_err(|_| header_error())?;
    let sum: u32 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| if CHECKSUM.contains(&i) { u32::from(b' ') } else { u32::from(b) })
        .sum();
    if stored != sum {
        return Err(header_error());
    }
    Ok(())
}

/// Parse `"<len> key=value\n"` records.
fn parse_pax(mut body: &[u8]) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    while !body.is_empty() && body[0] != 0 {
        let space = bytes::index_byte(body, b' ').ok_or_else(header_error)?;
        let len: usize = std::str::from_utf8(&body[..space])
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n| n > space && n <= body.len())
            .ok_or_else(header_error)?;
        let record = &body[space + 1..len];
        let record = record.strip_suffix(b"\n").ok_or_else(header_error)?;
        let eq = bytes::index_byte(record, b'=').ok_or_else(header_error)?;
        out.push((
            String::from_utf8_lossy(&record[..eq]).into_owned(),
            String::from_utf8_lossy(&record[eq + 1..]).into_owned(),
        ));
        body = &body[len..];
    }
    Ok(out)
}

/// Archive writer appending into a byte buffer.
pub struct ArchiveWriter {
    builder: Builder<BufferSink>,
}

impl ArchiveWriter {
    pub fn new(sink: BufferSink) -> Self {
        let mut builder = Builder::new(sink);
        builder.mode(tar::HeaderMode::Deterministic);
        Self { builder }
    }

    /// Add a regular file with mode 0644.
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let mut header = Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        self.builder
            .append_data(&mut header, name, data)
            .map_err(|e| Error::other(format!("archive/tar: {}", e)))
    }

    pub fn flush(&mut self) -> Result<()> {
        use std::io::Write;
        self.builder.get_mut().flush()?;
        Ok(())
    }

    /// Write the end-of-archive trailer.
    pub fn close(&mut self) -> Result<()> {
        self.builder.finish()?;
        Ok(())
    }
}

fn register_reader(out_reader: &mut FatTarReader, data: Vec<u8>) {
    *out_reader = FatTarReader::register(Mutex::new(ArchiveReader::new(data)));
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarReaderNewBytes(
    b: FatBytes,
    out_reader: *mut FatTarReader,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TarReaderNewBytes";
    let out_err = ffi::out_err(OP, out_err);
    let out_reader = raw::out(OP, out_reader, "out_reader");
    *out_reader = FatTarReader::invalid();
    let data = b.resolve(OP).as_slice().to_vec();
    ffi::complete(OP, out_err, Ok(data), |data| register_reader(out_reader, data))
}

/// # Safety
///
/// `path` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarReaderOpenPathUTF8(
    path: *const c_char,
    out_reader: *mut FatTarReader,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TarReaderOpenPathUTF8";
    let out_err = ffi::out_err(OP, out_err);
    let out_reader = raw::out(OP, out_reader, "out_reader");
    *out_reader = FatTarReader::invalid();
    let path = raw::cstr_text(OP, path, "path");
    let result = std::fs::read(&*path).map_err(Error::from);
    ffi::complete(OP, out_err, result, |data| register_reader(out_reader, data))
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarReaderFree(r: FatTarReader, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_TarReaderFree";
    let out_err = ffi::out_err(OP, out_err);
    r.release(OP);
    ffi::complete(OP, out_err, Ok(()), |()| ())
}

/// Advances to the next entry. At the end of the archive sets `*out_eof`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarReaderNext(
    r: FatTarReader,
    out_hdr: *mut FatTarHeader,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TarReaderNext";
    let out_err = ffi::out_err(OP, out_err);
    let out_hdr = raw::out(OP, out_hdr, "out_hdr");
    let out_eof = raw::out(OP, out_eof, "out_eof");
    *out_hdr = FatTarHeader::invalid();
    *out_eof = false;
    let result = r.resolve(OP).lock().next_entry();
    ffi::complete(OP, out_err, result, |hdr| match hdr {
        Some(hdr) => *out_hdr = FatTarHeader::register(hdr),
        None => *out_eof = true,
    })
}

/// Reads the current entry's body into `dst`.
///
/// # Safety
///
/// `dst` must be valid for writes of `len` bytes; out-pointers must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarReaderRead(
    r: FatTarReader,
    dst: *mut c_void,
    len: usize,
    out_n: *mut usize,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TarReaderRead";
    let out_err = ffi::out_err(OP, out_err);
    let out_n = raw::out(OP, out_n, "out_n");
    let out_eof = raw::out(OP, out_eof, "out_eof");
    *out_n = 0;
    *out_eof = false;
    let dst = raw::span_mut(OP, dst, len);
    let result = r.resolve(OP).lock().read(dst);
    ffi::complete(OP, out_err, result, |(n, eof)| {
        *out_n = n;
        *out_eof = eof;
    })
}

/// Releases the header.
#[no_mangle]
pub extern "C" fn fat_TarHeaderFree(h: FatTarHeader) {
    h.release("fat_TarHeaderFree");
}

/// Entry name, with long-name extensions applied.
#[no_mangle]
pub extern "C" fn fat_TarHeaderName(h: FatTarHeader) -> FatString {
    new_string(h.resolve("fat_TarHeaderName").name.as_str())
}

/// Raw typeflag byte (`'0'` regular, `'5'` directory, ...).
#[no_mangle]
pub extern "C" fn fat_TarHeaderTypeflag(h: FatTarHeader) -> u8 {
    h.resolve("fat_TarHeaderTypeflag").typeflag
}

/// Declared body size in bytes.
#[no_mangle]
pub extern "C" fn fat_TarHeaderSize(h: FatTarHeader) -> i64 {
    h.resolve("fat_TarHeaderSize").size
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarWriterNewToBytesBuffer(
    dst: FatBytesBuffer,
    out_writer: *mut FatTarWriter,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TarWriterNewToBytesBuffer";
    let out_err = ffi::out_err(OP, out_err);
    let out_writer = raw::out(OP, out_writer, "out_writer");
    *out_writer = FatTarWriter::invalid();
    let sink = BufferSink::resolve(dst, OP);
    ffi::complete(OP, out_err, Ok(sink), |sink| {
        *out_writer = FatTarWriter::register(Mutex::new(ArchiveWriter::new(sink)))
    })
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarWriterAddBytes(
    w: FatTarWriter,
    name: FatString,
    data: FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TarWriterAddBytes";
    let out_err = ffi::out_err(OP, out_err);
    let (name, data) = (name.resolve(OP), data.resolve(OP));
    let result = w.resolve(OP).lock().add_bytes(&name.to_str_lossy(), data.as_slice());
    ffi::complete(OP, out_err, result, |()| ())
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarWriterFlush(w: FatTarWriter, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_TarWriterFlush";
    let out_err = ffi::out_err(OP, out_err);
    let result = w.resolve(OP).lock().flush();
    ffi::complete(OP, out_err, result, |()| ())
}

/// Writes the trailer and releases the writer, even on failure.
///
/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TarWriterClose(w: FatTarWriter, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_TarWriterClose";
    let out_err = ffi::out_err(OP, out_err);
    let result = w.release(OP).lock().close();
    ffi::complete(OP, out_err, result, |()| ())
}
