//! Whole-buffer compression: gzip, zlib, raw DEFLATE, LZW and bzip2.
//!
//! Every codec takes a bytes handle and produces a new one. Corrupt input
//! is `SYNTAX`, input that stops early is `EOF`.

use std::io::{self, Read, Write};
use std::os::raw::c_int;

use flate2::read::MultiGzDecoder;
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::{Compression, Decompress, FlushDecompress};
use weezl::BitOrder;

use crate::bytes::Bytes;
use crate::error::{Error, Result};
use crate::ffi::{self, raw, FatBytes, FatError};
use crate::types::{LzwOrder, Status};

fn unexpected_eof() -> Error {
    Error::UnexpectedEof("unexpected EOF".to_string())
}

fn codec_error(format: &str, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => unexpected_eof(),
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            Error::syntax(format!("{}: {}", format, err))
        }
        _ => Error::Io(err),
    }
}

fn finish<W: Write>(
    mut enc: W,
    data: &[u8],
    finish: impl FnOnce(W) -> io::Result<Vec<u8>>,
) -> Result<Vec<u8>> {
    enc.write_all(data)?;
    Ok(finish(enc)?)
}

pub fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    finish(GzEncoder::new(Vec::new(), Compression::default()), data, |e| e.finish())
}

/// Decompress one or more concatenated gzip members.
pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    MultiGzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| codec_error("gzip", e))?;
    Ok(out)
}

pub fn zlib_compress(data: &[u8]) -> Result<Vec<u8>> {
    finish(ZlibEncoder::new(Vec::new(), Compression::default()), data, |e| e.finish())
}

pub fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>> {
    inflate(data, true, "zlib")
}

pub fn flate_compress(data: &[u8]) -> Result<Vec<u8>> {
    finish(DeflateEncoder::new(Vec::new(), Compression::default()), data, |e| e.finish())
}

pub fn flate_decompress(data: &[u8]) -> Result<Vec<u8>> {
    inflate(data, false, "flate")
}

/// Inflate a complete stream, telling corrupt input apart from input that
/// ends before the final block.
fn inflate(data: &[u8], zlib_header: bool, format: &str) -> Result<Vec<u8>> {
    let mut z = Decompress::new(zlib_header);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2).max(64));
    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let (in_before, out_before) = (z.total_in(), z.total_out());
        let status = z
            .decompress_vec(&data[in_before as usize..], &mut out, FlushDecompress::None)
            .map_err(|e| Error::syntax(format!("{}: {}", format, e)))?;
        if status == flate2::Status::StreamEnd {
            return Ok(out);
        }
        let consumed_all = z.total_in() as usize == data.len();
        let stalled = z.total_in() == in_before && z.total_out() == out_before;
        if consumed_all && out.len() < out.capacity() {
            return Err(unexpected_eof());
        }
        if stalled && out.len() < out.capacity() {
            return Err(Error::syntax(format!("{}: corrupt input", format)));
        }
    }
}

fn lzw_params(order: c_int, lit_width: u8) -> Result<(BitOrder, u8)> {
    let order = match LzwOrder::try_from(order) {
        Ok(LzwOrder::Lsb) => BitOrder::Lsb,
        Ok(LzwOrder::Msb) => BitOrder::Msb,
        Err(_) => return Err(Error::range("invalid LZW order")),
    };
    if !(2..=8).contains(&lit_width) {
        return Err(Error::range(format!("lzw: litWidth {} out of range", lit_width)));
    }
    Ok((order, lit_width))
}

pub fn lzw_compress(data: &[u8], order: c_int, lit_width: u8) -> Result<Vec<u8>> {
    let (order, width) = lzw_params(order, lit_width)?;
    if data.iter().any(|&b| width < 8 && b >> width != 0) {
        return Err(Error::other("lzw: input byte too large for the litWidth"));
    }
    weezl::encode::Encoder::new(order, width)
        .encode(data)
        .map_err(|e| Error::other(format!("lzw: {}", e)))
}

pub fn lzw_decompress(data: &[u8], order: c_int, lit_width: u8) -> Result<Vec<u8>> {
    let (order, width) = lzw_params(order, lit_width)?;
    let mut decoder = weezl::decode::Decoder::new(order, width);
    let mut out = Vec::new();
    decoder
        .into_vec(&mut out)
        .decode_all(data)
        .status
        .map_err(|e| Error::syntax(format!("lzw: {}", e)))?;
    // The status stays `Ok` after the end code, so ask the decoder directly.
    if !decoder.has_ended() {
        return Err(unexpected_eof());
    }
    Ok(out)
}

pub fn bzip2_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    bzip2::read::MultiBzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| codec_error("bzip2", e))?;
    Ok(out)
}

/// Shared body of every codec export.
unsafe fn codec_export(
    op: &str,
    b: FatBytes,
    out_bytes: *mut FatBytes,
    out_err: *mut FatError,
    codec: impl FnOnce(&[u8]) -> Result<Vec<u8>>,
) -> Status {
    let out_err = ffi::out_err(op, out_err);
    let out_bytes = raw::out(op, out_bytes, "out_bytes");
    *out_bytes = FatBytes::invalid();
    let input = b.resolve(op);
    let result = codec(input.as_slice());
    if let Err(e) = &result {
        tracing::debug!(op, input_len = input.as_slice().len(), error = %e, "codec failed");
    }
    ffi::complete(op, out_err, result, |data| *out_bytes = FatBytes::register(Bytes::new(data)))
}

macro_rules! codec_exports {
    ($($name:ident => $codec:path),* $(,)?) => {
        $(
            /// # Safety
            ///
            /// Out-pointers must be valid for writes.
            #[no_mangle]
            pub unsafe extern "C" fn $name(
                b: FatBytes,
                out_bytes: *mut FatBytes,
                out_err: *mut FatError,
            ) -> Status {
                codec_export(stringify!($name), b, out_bytes, out_err, $codec)
            }
        )*
    };
}

codec_exports! {
    fat_GzipCompress => gzip_compress,
    fat_GzipDecompress => gzip_decompress,
    fat_ZlibCompress => zlib_compress,
    fat_ZlibDecompress => zlib_decompress,
    fat_FlateCompress => flate_compress,
    fat_FlateDecompress => flate_decompress,
    fat_Bzip2Decompress => bzip2_decompress,
}

/// LZW-compresses `b`. `order` is 0 (LSB) or 1 (MSB); `lit_width` must be
/// in 2..=8, else `RANGE`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_LzwCompress(
    b: FatBytes,
    order: c_int,
    lit_width: u8,
    out_bytes: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    codec_export("fat_LzwCompress", b, out_bytes, out_err, |data| {
        lzw_compress(data, order, lit_width)
    })
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_LzwDecompress(
    b: FatBytes,
    order: c_int,
    lit_width: u8,
    out_bytes: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    codec_export("fat_LzwDecompress", b, out_bytes, out_err, |data| {
        lzw_decompress(data, order, lit_width)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &[u8] = b"hello hello hello compressed world, hello again";

    #[test]
    fn test_deflate_family_round_trip() {
        assert_eq!(gzip_decompress(&gzip_compress(TEXT).unwrap()).unwrap(), TEXT);
        assert_eq!(zlib_decompress(&zlib_compress(TEXT).unwrap()).unwrap(), TEXT);
        assert_eq!(flate_decompress(&flate_compress(TEXT).unwrap()).unwrap(), TEXT);
    }

    #[test]
    fn test_concatenated_gzip_members() {
        let mut data = gzip_compress(b"ab").unwrap();
        data.extend(gzip_compress(b"cd").unwrap());
        assert_eq!(gzip_decompress(&data).unwrap(), b"abcd");
    }

    #[test]
    fn test_truncated_zlib_is_eof() {
        let data = zlib_compress(TEXT).unwrap();
        let err = zlib_decompress(&data[..data.len() / 2]).unwrap_err();
        assert_eq!(err.status(), Status::Eof);
    }

    #[test]
    fn test_corrupt_input_is_syntax() {
        assert_eq!(zlib_decompress(b"not zlib at all").unwrap_err().status(), Status::Syntax);
        assert_eq!(gzip_decompress(b"not gzip at all").unwrap_err().status(), Status::Syntax);
    }

    #[test]
    fn test_lzw_orders_and_widths() {
        for order in [0, 1] {
            let packed = lzw_compress(TEXT, order, 8).unwrap();
            assert_eq!(lzw_decompress(&packed, order, 8).unwrap(), TEXT);
        }
        let small = [0u8, 1, 2, 3, 3, 2, 1, 0];
        let packed = lzw_compress(&small, 0, 2).unwrap();
        assert_eq!(lzw_decompress(&packed, 0, 2).unwrap(), small);
    }

    #[test]
    fn test_lzw_empty_input_round_trip() {
        for order in [0, 1] {
            let packed = lzw_compress(b"", order, 8).unwrap();
            assert!(!packed.is_empty());
            assert_eq!(lzw_decompress(&packed, order, 8).unwrap(), b"");
        }
    }

    #[test]
    fn test_lzw_missing_end_code_is_eof() {
        let packed = lzw_compress(b"hello hello hello", 0, 8).unwrap();
        let err = lzw_decompress(&packed[..packed.len() / 2], 0, 8).unwrap_err();
        assert_eq!(err.status(), Status::Eof);
        assert_eq!(lzw_decompress(b"", 0, 8).unwrap_err().status(), Status::Eof);
    }

    #[test]
    fn test_lzw_bad_params_are_range() {
        assert_eq!(lzw_compress(TEXT, 2, 8).unwrap_err().status(), Status::Range);
        assert_eq!(lzw_compress(TEXT, 0, 1).unwrap_err().status(), Status::Range);
        assert_eq!(lzw_decompress(TEXT, 0, 9).unwrap_err().status(), Status::Range);
    }

    #[test]
    fn test_bzip2_decompress() {
        let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        enc.write_all(TEXT).unwrap();
        let packed = enc.finish().unwrap();
        assert_eq!(bzip2_decompress(&packed).unwrap(), TEXT);
        assert_eq!(bzip2_decompress(b"BZh9garbage").unwrap_err().status(), Status::Syntax);
    }

    #[test]
    fn test_codec_export_sets_handles() {
        let input = FatBytes::register(Bytes::new(TEXT.to_vec()));
        let mut packed = FatBytes::invalid();
        let mut err = FatError::invalid();
        let status = unsafe { fat_GzipCompress(input, &mut packed, &mut err) };
        assert_eq!(status, Status::Ok);
        assert!(!err.is_valid());
        let mut plain = FatBytes::invalid();
        let status = unsafe { fat_ZlibDecompress(packed, &mut plain, &mut err) };
        assert_eq!(status, Status::Syntax);
        assert!(!plain.is_valid());
        assert!(err.is_valid());
        crate::error::fat_ErrorFree(err);
        crate::bytes::fat_BytesFree(packed);
        crate::bytes::fat_BytesFree(input);
    }
}
