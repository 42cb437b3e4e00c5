//! Handle types for opaque references to table-owned objects.
//!
//! Each handle type is a newtype around a machine word, ABI-identical to the
//! `uintptr_t` the C header declares. The macro ties every handle type to
//! the one object type it may name, so resolving a handle through the wrong
//! accessor is caught as a kind mismatch.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{contract, registry};

/// Macro to define a handle type bound to the object type it refers to.
macro_rules! define_handle {
    ($name:ident, $kind:literal, $obj:ty) => {
        #[doc = concat!("Opaque handle to a ", $kind, ".")]
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            _h: usize,
        }

        impl $name {
            /// Kind name used in diagnostics.
            pub const KIND: &'static str = $kind;

            /// Create an invalid (absent) handle.
            #[inline]
            pub const fn invalid() -> Self {
                Self { _h: 0 }
            }

            /// Check if this handle is valid (non-zero).
            #[inline]
            pub const fn is_valid(&self) -> bool {
                self._h != 0
            }

            /// Raw token value.
            #[inline]
            pub const fn raw(&self) -> usize {
                self._h
            }

            /// Wrap a raw token.
            #[inline]
            pub const fn from_raw(h: usize) -> Self {
                Self { _h: h }
            }

            #[allow(dead_code)]
            pub(crate) fn register(value: $obj) -> Self {
                Self::register_shared(Arc::new(value))
            }

            pub(crate) fn register_shared(value: Arc<$obj>) -> Self {
                let h = contract::handle(
                    concat!("allocate ", $kind),
                    registry::global().allocate_shared($kind, value),
                );
                Self { _h: h }
            }

            /// Resolve to the live object, aborting on any misuse.
            pub(crate) fn resolve(self, op: &str) -> Arc<$obj> {
                contract::handle(op, registry::global().resolve::<$obj>($kind, self._h))
            }

            /// Release the handle, aborting on any misuse.
            pub(crate) fn release(self, op: &str) -> Arc<$obj> {
                contract::handle(op, registry::global().release::<$obj>($kind, self._h))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::invalid()
            }
        }
    };
}

define_handle!(FatError, "error", crate::error::ErrorObject);
define_handle!(FatString, "string", crate::string::Text);
define_handle!(FatStringArray, "string array", crate::string::TextArray);
define_handle!(FatBytes, "bytes", crate::bytes::Bytes);
define_handle!(FatBytesArray, "bytes array", crate::bytes::BytesArray);
define_handle!(FatBytesBuffer, "bytes buffer", Mutex<crate::buffer::Buffer>);
define_handle!(FatBytesReader, "bytes reader", Mutex<crate::reader::SliceReader>);
define_handle!(FatStringReader, "string reader", Mutex<crate::reader::StringReader>);
define_handle!(FatStringBuilder, "string builder", Mutex<crate::builder::StringBuilder>);
define_handle!(FatBase64Encoding, "base64 encoding", crate::base64::Encoding);
define_handle!(FatBase64Encoder, "base64 encoder", Mutex<crate::base64::StreamEncoder>);
define_handle!(FatJsonValue, "json value", crate::json::JsonValue);
define_handle!(FatJsonDecoder, "json decoder", Mutex<crate::json::StreamDecoder>);
define_handle!(FatJsonEncoder, "json encoder", Mutex<crate::json::StreamEncoder>);
define_handle!(FatXmlDecoder, "xml decoder", Mutex<crate::xml::Decoder>);
define_handle!(FatXmlToken, "xml token", crate::xml::Token);
define_handle!(FatXmlEncoder, "xml encoder", Mutex<crate::xml::Encoder>);
define_handle!(FatCsvReader, "csv reader", Mutex<crate::csv::RecordReader>);
define_handle!(FatCsvWriter, "csv writer", Mutex<crate::csv::RecordWriter>);
define_handle!(FatTarReader, "tar reader", Mutex<crate::tar::ArchiveReader>);
define_handle!(FatTarHeader, "tar header", crate::tar::EntryHeader);
define_handle!(FatTarWriter, "tar writer", Mutex<crate::tar::ArchiveWriter>);
define_handle!(FatZipReader, "zip reader", crate::zip::Archive);
define_handle!(FatZipFile, "zip file", crate::zip::ArchiveFile);
define_handle!(FatZipFileReader, "zip file reader", Mutex<crate::zip::EntryReader>);
define_handle!(FatZipWriter, "zip writer", Mutex<crate::zip::ArchiveWriter>);
define_handle!(FatTcpConn, "tcp conn", crate::net::TcpConn);
define_handle!(FatTcpListener, "tcp listener", crate::net::TcpListen);
define_handle!(FatUdpConn, "udp conn", crate::net::UdpConn);
define_handle!(FatHttpClient, "http client", crate::http::Client);
define_handle!(FatHttpResponse, "http response", crate::http::Response);
define_handle!(FatHttpServer, "http server", crate::http::Server);
define_handle!(FatHttpRequest, "http request", crate::http::Request);
define_handle!(FatTiledMap, "tiled map", crate::tiled::Map);
define_handle!(FatTiledLayer, "tiled layer", crate::tiled::Layer);
define_handle!(FatTiledLayerTile, "tiled layer tile", crate::tiled::LayerTile);
define_handle!(FatTiledProperties, "tiled properties", crate::tiled::Properties);
