//! ZIP archive reading and writing on top of the `zip` crate.
//!
//! An [`Archive`] holds the whole archive in memory and lists its entries
//! up front. Opening an entry inflates it in one go; the resulting
//! [`EntryReader`] then serves reads from memory.

use std::io::{Cursor, Read, Write};
use std::os::raw::{c_char, c_void};
use std::sync::Arc;

use parking_lot::Mutex;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::buffer::BufferSink;
use crate::error::{Error, Result};
use crate::ffi::{
    self, contract, raw, FatBytes, FatBytesBuffer, FatError, FatString, FatZipFile,
    FatZipFileReader, FatZipReader, FatZipWriter,
};
use crate::reader::SliceReader;
use crate::string::new_string;
use crate::types::Status;

fn zip_error(err: ZipError) -> Error {
    match err {
        ZipError::Io(e) => Error::Io(e),
        ZipError::InvalidArchive(msg) => {
            Error::syntax(format!("zip: not a valid zip file: {}", msg))
        }
        other => Error::other(format!("zip: {}", other)),
    }
}

/// One entry of an archive. Keeps the archive bytes alive on its own.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    data: Arc<Vec<u8>>,
    index: usize,
    pub name: String,
    pub size: u64,
}

impl ArchiveFile {
    /// Decompress the entry, checking its CRC.
    pub fn open(&self) -> Result<EntryReader> {
        let mut archive = ZipArchive::new(Cursor::new(self.data.as_slice())).map_err(zip_error)?;
        let mut file = archive.by_index(self.index).map_err(zip_error)?;
        let mut out = Vec::with_capacity(usize::try_from(self.size).unwrap_or(0));
        file.read_to_end(&mut out)?;
        Ok(EntryReader(SliceReader::new(out)))
    }
}

/// A parsed archive and its entry list.
#[derive(Debug)]
pub struct Archive {
    files: Vec<ArchiveFile>,
}

impl Archive {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let data = Arc::new(data);
        let mut archive = ZipArchive::new(Cursor::new(data.as_slice())).map_err(zip_error)?;
        let mut files = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index).map_err(zip_error)?;
            files.push(ArchiveFile {
                data: Arc::clone(&data),
                index,
                name: entry.name().to_string(),
                size: entry.size(),
            });
        }
        tracing::debug!(files = files.len(), "zip archive opened");
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file(&self, idx: usize) -> Option<&ArchiveFile> {
        self.files.get(idx)
    }
}

/// Reader over one inflated entry.
#[derive(Debug)]
pub struct EntryReader(SliceReader);

impl EntryReader {
    pub fn read(&mut self, dst: &mut [u8]) -> (usize, bool) {
        self.0.read(dst)
    }
}

/// Builds an archive in memory and hands it to the buffer on close.
pub struct ArchiveWriter {
    zip: Option<ZipWriter<Cursor<Vec<u8>>>>,
    sink: BufferSink,
}

impl ArchiveWriter {
    pub fn new(sink: BufferSink) -> Self {
        Self {
            zip: Some(ZipWriter::new(Cursor::new(Vec::new()))),
            sink,
        }
    }

    fn zip(&mut self) -> Result<&mut ZipWriter<Cursor<Vec<u8>>>> {
        self.zip.as_mut().ok_or_else(|| Error::other("zip: writer is closed"))
    }

    /// Add a deflated entry.
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let zip = self.zip()?;
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(data)?;
        Ok(())
    }

    /// Write the central directory and move the archive into the buffer.
    pub fn close(&mut self) -> Result<()> {
        let zip = self.zip.take().ok_or_else(|| Error::other("zip: writer is closed"))?;
        let cursor = zip.finish().map_err(zip_error)?;
        self.sink.append(cursor.get_ref());
        Ok(())
    }
}

fn open_archive(
    op: &str,
    out_reader: &mut FatZipReader,
    out_err: &mut FatError,
    data: Result<Vec<u8>>,
) -> Status {
    let result = data.and_then(Archive::new);
    ffi::complete(op, out_err, result, |archive| *out_reader = FatZipReader::register(archive))
}

/// # Safety
///
/// `path` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipReaderOpenPathUTF8(
    path: *const c_char,
    out_reader: *mut FatZipReader,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ZipReaderOpenPathUTF8";
    let out_err = ffi::out_err(OP, out_err);
    let out_reader = raw::out(OP, out_reader, "out_reader");
    *out_reader = FatZipReader::invalid();
    let path = raw::cstr_text(OP, path, "path");
    open_archive(OP, out_reader, out_err, std::fs::read(&*path).map_err(Error::from))
}

/// Parses an archive from a copy of `b`. A malformed archive is `SYNTAX`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipReaderNewBytes(
    b: FatBytes,
    out_reader: *mut FatZipReader,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ZipReaderNewBytes";
    let out_err = ffi::out_err(OP, out_err);
    let out_reader = raw::out(OP, out_reader, "out_reader");
    *out_reader = FatZipReader::invalid();
    let data = b.resolve(OP).as_slice().to_vec();
    open_archive(OP, out_reader, out_err, Ok(data))
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipReaderFree(r: FatZipReader, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_ZipReaderFree";
    let out_err = ffi::out_err(OP, out_err);
    r.release(OP);
    ffi::complete(OP, out_err, Ok(()), |()| ())
}

/// Number of entries in the central directory.
#[no_mangle]
pub extern "C" fn fat_ZipReaderNumFiles(r: FatZipReader) -> usize {
    r.resolve("fat_ZipReaderNumFiles").len()
}

/// Returns a new handle for entry `idx`; out of range is fatal.
#[no_mangle]
pub extern "C" fn fat_ZipReaderFileByIndex(r: FatZipReader, idx: usize) -> FatZipFile {
    const OP: &str = "fat_ZipReaderFileByIndex";
    let archive = r.resolve(OP);
    match archive.file(idx) {
        Some(file) => FatZipFile::register(file.clone()),
        None => contract::violation(
            OP,
            format_args!("index {} out of range ({})", idx, archive.len()),
        ),
    }
}

/// Releases the entry handle.
#[no_mangle]
pub extern "C" fn fat_ZipFileFree(f: FatZipFile) {
    f.release("fat_ZipFileFree");
}

/// Entry name as stored in the archive.
#[no_mangle]
pub extern "C" fn fat_ZipFileName(f: FatZipFile) -> FatString {
    new_string(f.resolve("fat_ZipFileName").name.as_str())
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipFileOpen(
    f: FatZipFile,
    out_reader: *mut FatZipFileReader,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ZipFileOpen";
    let out_err = ffi::out_err(OP, out_err);
    let out_reader = raw::out(OP, out_reader, "out_reader");
    *out_reader = FatZipFileReader::invalid();
    let result = f.resolve(OP).open();
    ffi::complete(OP, out_err, result, |reader| {
        *out_reader = FatZipFileReader::register(Mutex::new(reader))
    })
}

/// # Safety
///
/// `dst` must be valid for writes of `len` bytes; out-pointers must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipFileReaderRead(
    r: FatZipFileReader,
    dst: *mut c_void,
    len: usize,
    out_n: *mut usize,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ZipFileReaderRead";
    let out_err = ffi::out_err(OP, out_err);
    let out_n = raw::out(OP, out_n, "out_n");
    let out_eof = raw::out(OP, out_eof, "out_eof");
    let dst = raw::span_mut(OP, dst, len);
    let (n, eof) = r.resolve(OP).lock().read(dst);
    ffi::complete(OP, out_err, Ok(()), |()| {
        *out_n = n;
        *out_eof = eof;
    })
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipFileReaderClose(
    r: FatZipFileReader,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ZipFileReaderClose";
    let out_err = ffi::out_err(OP, out_err);
    r.release(OP);
    ffi::complete(OP, out_err, Ok(()), |()| ())
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipWriterNewToBytesBuffer(
    dst: FatBytesBuffer,
    out_writer: *mut FatZipWriter,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ZipWriterNewToBytesBuffer";
    let out_err = ffi::out_err(OP, out_err);
    let out_writer = raw::out(OP, out_writer, "out_writer");
    *out_writer = FatZipWriter::invalid();
    let sink = BufferSink::resolve(dst, OP);
    ffi::complete(OP, out_err, Ok(sink), |sink| {
        *out_writer = FatZipWriter::register(Mutex::new(ArchiveWriter::new(sink)))
    })
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipWriterAddBytes(
    w: FatZipWriter,
    name: FatString,
    data: FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ZipWriterAddBytes";
    let out_err = ffi::out_err(OP, out_err);
    let (name, data) = (name.resolve(OP), data.resolve(OP));
    let result = w.resolve(OP).lock().add_bytes(&name.to_str_lossy(), data.as_slice());
    ffi::complete(OP, out_err, result, |()| ())
}

/// Writes the central directory into the buffer and releases the writer.
///
/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ZipWriterClose(w: FatZipWriter, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_ZipWriterClose";
    let out_err = ffi::out_err(OP, out_err);
    let result = w.release(OP).lock().close();
    ffi::complete(OP, out_err, result, |()| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let buf = Arc::new(Mutex::new(Buffer::default()));
        let mut w = ArchiveWriter::new(BufferSink::new(Arc::clone(&buf)));
        for (name, data) in entries {
            w.add_bytes(name, data).unwrap();
        }
        assert!(buf.lock().unread().is_empty());
        w.close().unwrap();
        assert!(w.close().is_err());
        let out = buf.lock().unread().to_vec();
        out
    }

    #[test]
    fn test_write_then_read() {
        let body = b"zip zip zip zip zip".repeat(20);
        let archive = Archive::new(build(&[("a.txt", &body), ("b/c", b"")])).unwrap();
        assert_eq!(archive.len(), 2);
        let a = archive.file(0).unwrap();
        assert_eq!(a.name, "a.txt");
        assert_eq!(a.size, body.len() as u64);
        let mut r = a.open().unwrap();
        let mut out = vec![0u8; body.len() + 1];
        let (n, eof) = r.read(&mut out);
        assert_eq!(&out[..n], &body[..]);
        assert!(eof);
        assert_eq!(archive.file(1).unwrap().name, "b/c");
        assert!(archive.file(2).is_none());
    }

    #[test]
    fn test_file_outlives_archive() {
        let archive = Archive::new(build(&[("x", b"kept")])).unwrap();
        let file = archive.file(0).unwrap().clone();
        drop(archive);
        let mut r = file.open().unwrap();
        let mut out = [0u8; 4];
        assert_eq!(r.read(&mut out), (4, false));
        assert_eq!(&out, b"kept");
    }

    #[test]
    fn test_garbage_is_syntax() {
        let err = Archive::new(b"definitely not a zip archive".to_vec()).unwrap_err();
        assert_eq!(err.status(), Status::Syntax);
    }
}
