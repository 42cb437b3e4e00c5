//! TAR and ZIP archives written to a bytes buffer and read back.

mod common;

use common::{bytes, cstr, new_buffer, string, take_buffer, take_error, take_string};
use fatstd::bytes::fat_BytesFree;
use fatstd::string::fat_StringFree;
use fatstd::tar::{
    fat_TarHeaderFree, fat_TarHeaderName, fat_TarHeaderSize, fat_TarHeaderTypeflag,
    fat_TarReaderFree, fat_TarReaderNewBytes, fat_TarReaderNext, fat_TarReaderOpenPathUTF8,
    fat_TarReaderRead, fat_TarWriterAddBytes, fat_TarWriterClose, fat_TarWriterNewToBytesBuffer,
};
use fatstd::zip::{
    fat_ZipFileFree, fat_ZipFileName, fat_ZipFileOpen, fat_ZipFileReaderClose,
    fat_ZipFileReaderRead, fat_ZipReaderFileByIndex, fat_ZipReaderFree, fat_ZipReaderNewBytes,
    fat_ZipReaderNumFiles, fat_ZipReaderOpenPathUTF8, fat_ZipWriterAddBytes, fat_ZipWriterClose,
    fat_ZipWriterNewToBytesBuffer,
};
use fatstd::{
    FatError, FatTarHeader, FatTarReader, FatTarWriter, FatZipFileReader, FatZipReader,
    FatZipWriter, Status,
};

const ENTRIES: [(&str, &[u8]); 3] = [
    ("a.txt", b"alpha"),
    ("dir/b.bin", b"\x00\x01\x02"),
    ("empty", b""),
];

fn build_tar() -> Vec<u8> {
    let buf = new_buffer();
    let mut w = FatTarWriter::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_TarWriterNewToBytesBuffer(buf, &mut w, &mut err) }, Status::Ok);
    for (name, data) in ENTRIES {
        let (n, d) = (string(name), bytes(data));
        assert_eq!(unsafe { fat_TarWriterAddBytes(w, n, d, &mut err) }, Status::Ok);
        fat_StringFree(n);
        fat_BytesFree(d);
    }
    assert_eq!(unsafe { fat_TarWriterClose(w, &mut err) }, Status::Ok);
    take_buffer(buf)
}

fn read_tar(r: FatTarReader) -> Vec<(String, u8, i64, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = FatError::invalid();
    loop {
        let mut hdr = FatTarHeader::invalid();
        let mut eof = false;
        assert_eq!(unsafe { fat_TarReaderNext(r, &mut hdr, &mut eof, &mut err) }, Status::Ok);
        if eof {
            break;
        }
        let mut body = Vec::new();
        loop {
            let mut chunk = [0u8; 2];
            let mut n = 0usize;
            let mut body_eof = false;
            let status = unsafe {
                fat_TarReaderRead(
                    r,
                    chunk.as_mut_ptr().cast(),
                    chunk.len(),
                    &mut n,
                    &mut body_eof,
                    &mut err,
                )
            };
            assert_eq!(status, Status::Ok);
            body.extend_from_slice(&chunk[..n]);
            if body_eof {
                break;
            }
        }
        out.push((
            take_string(fat_TarHeaderName(hdr)),
            fat_TarHeaderTypeflag(hdr),
            fat_TarHeaderSize(hdr),
            body,
        ));
        fat_TarHeaderFree(hdr);
    }
    out
}

fn assert_entries(got: &[(String, u8, i64, Vec<u8>)]) {
    assert_eq!(got.len(), ENTRIES.len());
    for ((name, flag, size, body), (want_name, want_body)) in got.iter().zip(ENTRIES) {
        assert_eq!(name, want_name);
        assert_eq!(*flag, b'0');
        assert_eq!(*size, want_body.len() as i64);
        assert_eq!(body, want_body);
    }
}

#[test]
fn test_tar_round_trip() {
    let archive = build_tar();
    assert_eq!(archive.len() % 512, 0);

    let data = bytes(&archive);
    let mut r = FatTarReader::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_TarReaderNewBytes(data, &mut r, &mut err) }, Status::Ok);
    fat_BytesFree(data);
    assert_entries(&read_tar(r));
    assert_eq!(unsafe { fat_TarReaderFree(r, &mut err) }, Status::Ok);
}

#[test]
fn test_tar_open_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.tar");
    std::fs::write(&path, build_tar()).unwrap();

    let p = cstr(path.to_str().unwrap());
    let mut r = FatTarReader::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_TarReaderOpenPathUTF8(p.as_ptr(), &mut r, &mut err) }, Status::Ok);
    assert_entries(&read_tar(r));
    assert_eq!(unsafe { fat_TarReaderFree(r, &mut err) }, Status::Ok);

    let missing = cstr(dir.path().join("missing.tar").to_str().unwrap());
    let status = unsafe { fat_TarReaderOpenPathUTF8(missing.as_ptr(), &mut r, &mut err) };
    assert_eq!(status, Status::Other);
    assert!(!r.is_valid());
    take_error(err, Status::Other);
}

#[test]
fn test_tar_bad_checksum() {
    let mut archive = build_tar();
    archive[0] ^= 0x20;
    let data = bytes(&archive);
    let mut r = FatTarReader::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_TarReaderNewBytes(data, &mut r, &mut err) }, Status::Ok);
    fat_BytesFree(data);

    let mut hdr = FatTarHeader::invalid();
    let mut eof = false;
    let status = unsafe { fat_TarReaderNext(r, &mut hdr, &mut eof, &mut err) };
    assert_eq!(status, Status::Syntax);
    assert!(!hdr.is_valid());
    take_error(err, Status::Syntax);
    assert_eq!(unsafe { fat_TarReaderFree(r, &mut err) }, Status::Ok);
}

fn build_zip() -> Vec<u8> {
    let buf = new_buffer();
    let mut w = FatZipWriter::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_ZipWriterNewToBytesBuffer(buf, &mut w, &mut err) }, Status::Ok);
    for (name, data) in ENTRIES {
        let (n, d) = (string(name), bytes(data));
        assert_eq!(unsafe { fat_ZipWriterAddBytes(w, n, d, &mut err) }, Status::Ok);
        fat_StringFree(n);
        fat_BytesFree(d);
    }
    assert_eq!(unsafe { fat_ZipWriterClose(w, &mut err) }, Status::Ok);
    take_buffer(buf)
}

fn read_zip(r: FatZipReader) -> Vec<(String, Vec<u8>)> {
    let mut err = FatError::invalid();
    (0..fat_ZipReaderNumFiles(r))
        .map(|i| {
            let f = fat_ZipReaderFileByIndex(r, i);
            let name = take_string(fat_ZipFileName(f));
            let mut fr = FatZipFileReader::invalid();
            assert_eq!(unsafe { fat_ZipFileOpen(f, &mut fr, &mut err) }, Status::Ok);
            let mut body = Vec::new();
            loop {
                let mut chunk = [0u8; 3];
                let mut n = 0usize;
                let mut eof = false;
                let status = unsafe {
                    fat_ZipFileReaderRead(
                        fr,
                        chunk.as_mut_ptr().cast(),
                        chunk.len(),
                        &mut n,
                        &mut eof,
                        &mut err,
                    )
                };
                assert_eq!(status, Status::Ok);
                body.extend_from_slice(&chunk[..n]);
                if eof {
                    break;
                }
            }
            assert_eq!(unsafe { fat_ZipFileReaderClose(fr, &mut err) }, Status::Ok);
            fat_ZipFileFree(f);
            (name, body)
        })
        .collect()
}

#[test]
fn test_zip_round_trip() {
    let archive = build_zip();
    let data = bytes(&archive);
    let mut r = FatZipReader::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_ZipReaderNewBytes(data, &mut r, &mut err) }, Status::Ok);
    fat_BytesFree(data);

    let got = read_zip(r);
    let want: Vec<(String, Vec<u8>)> = ENTRIES
        .iter()
        .map(|(n, d)| (n.to_string(), d.to_vec()))
        .collect();
    assert_eq!(got, want);
    assert_eq!(unsafe { fat_ZipReaderFree(r, &mut err) }, Status::Ok);
}

#[test]
fn test_zip_open_path_and_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.zip");
    std::fs::write(&path, build_zip()).unwrap();
    let p = cstr(path.to_str().unwrap());
    let mut r = FatZipReader::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_ZipReaderOpenPathUTF8(p.as_ptr(), &mut r, &mut err) }, Status::Ok);
    assert_eq!(fat_ZipReaderNumFiles(r), ENTRIES.len());
    assert_eq!(unsafe { fat_ZipReaderFree(r, &mut err) }, Status::Ok);

    let data = bytes(b"definitely not a zip archive");
    let status = unsafe { fat_ZipReaderNewBytes(data, &mut r, &mut err) };
    assert_eq!(status, Status::Syntax);
    assert!(!r.is_valid());
    take_error(err, Status::Syntax);
    fat_BytesFree(data);
}
