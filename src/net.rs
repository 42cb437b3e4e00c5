//! TCP and UDP sockets.
//!
//! Addresses are `host:port` strings. An empty host means every interface
//! when listening and the loopback interface when dialing; IPv6 hosts are
//! written in brackets (`[::1]:80`).

use std::io::{self, Read, Write};
use std::net::{
    IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs,
    UdpSocket,
};
use std::os::raw::{c_char, c_void};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ffi::{self, raw, FatError, FatString, FatTcpConn, FatTcpListener, FatUdpConn};
use crate::string::new_string;
use crate::types::Status;

/// Split `host:port`. A missing or non-numeric port is a syntax error.
pub(crate) fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let bad = |why: &str| Error::syntax(format!("address {}: {}", addr, why));
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(|| bad("missing ']' in address"))?;
        let port = rest[end + 1..].strip_prefix(':').ok_or_else(|| bad("missing port in address"))?;
        (&rest[..end], port)
    } else {
        let colon = addr.rfind(':').ok_or_else(|| bad("missing port in address"))?;
        let host = &addr[..colon];
        if host.contains(':') {
            return Err(bad("too many colons in address"));
        }
        (host, &addr[colon + 1..])
    };
    let port = port.parse::<u16>().map_err(|_| bad("invalid port"))?;
    Ok((host, port))
}

/// Resolve an address. `listen` picks the wildcard for an empty host.
pub(crate) fn resolve(addr: &str, listen: bool) -> Result<Vec<SocketAddr>> {
    let (host, port) = split_host_port(addr)?;
    if host.is_empty() {
        let ip = if listen {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Network(format!("lookup {}: {}", host, e)))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::Network(format!("lookup {}: no such host", host)));
    }
    Ok(addrs)
}

fn net_error(op: &str, addr: &str, err: io::Error) -> Error {
    Error::Network(format!("{} {}: {}", op, addr, err))
}

fn first_success<T>(
    addrs: &[SocketAddr],
    mut attempt: impl FnMut(&SocketAddr) -> io::Result<T>,
) -> io::Result<T> {
    let mut last = io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses");
    for addr in addrs {
        match attempt(addr) {
            Ok(v) => return Ok(v),
            Err(e) => last = e,
        }
    }
    Err(last)
}

fn addr_string(addr: io::Result<SocketAddr>) -> String {
    addr.map(|a| a.to_string()).unwrap_or_default()
}

/// A connected TCP stream.
#[derive(Debug)]
pub struct TcpConn {
    stream: TcpStream,
    local: String,
    remote: String,
}

impl TcpConn {
    fn from_stream(stream: TcpStream) -> Self {
        Self {
            local: addr_string(stream.local_addr()),
            remote: addr_string(stream.peer_addr()),
            stream,
        }
    }

    /// Connect to `addr`, trying each resolved address in turn.
    pub fn dial(addr: &str) -> Result<Self> {
        let addrs = resolve(addr, false)?;
        let stream = first_success(&addrs, |a| TcpStream::connect(a))
            .map_err(|e| net_error("dial tcp", addr, e))?;
        tracing::debug!(remote = %addr, "tcp connected");
        Ok(Self::from_stream(stream))
    }

    /// Read into `dst`. The flag is set when the peer closed the stream.
    pub fn read(&self, dst: &mut [u8]) -> Result<(usize, bool)> {
        if dst.is_empty() {
            return Ok((0, false));
        }
        let n = (&self.stream).read(dst).map_err(|e| net_error("read tcp", &self.remote, e))?;
        Ok((n, n == 0))
    }

    /// Write all of `src`.
    pub fn write(&self, src: &[u8]) -> Result<usize> {
        (&self.stream)
            .write_all(src)
            .map_err(|e| net_error("write tcp", &self.remote, e))?;
        Ok(src.len())
    }

    pub fn local_addr(&self) -> &str {
        &self.local
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote
    }

    /// Shut the stream down, waking blocked readers.
    pub fn close(&self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(net_error("close tcp", &self.remote, e)),
        }
    }
}

/// A listening TCP socket.
///
/// # Example
///
/// ```no_run
/// # fn main() -> fatstd::Result<()> {
/// let listener = fatstd::net::TcpListen::bind("127.0.0.1:0")?;
/// println!("listening on {}", listener.addr());
/// let conn = listener.accept()?;
/// conn.write(b"hello\n")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TcpListen {
    listener: TcpListener,
    addr: String,
    closed: AtomicBool,
}

impl TcpListen {
    pub fn bind(addr: &str) -> Result<Self> {
        let addrs = resolve(addr, true)?;
        let listener = first_success(&addrs, |a| TcpListener::bind(a))
            .map_err(|e| net_error("listen tcp", addr, e))?;
        let addr = addr_string(listener.local_addr());
        tracing::debug!(%addr, "tcp listening");
        Ok(Self {
            listener,
            addr,
            closed: AtomicBool::new(false),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Block until a client connects.
    pub fn accept(&self) -> Result<TcpConn> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        let (stream, _) = self
            .listener
            .accept()
            .map_err(|e| net_error("accept tcp", &self.addr, e))?;
        if self.closed.load(Ordering::Acquire) {
            return Err(self.closed_error());
        }
        Ok(TcpConn::from_stream(stream))
    }

    fn closed_error(&self) -> Error {
        Error::Network(format!("accept tcp {}: use of closed network connection", self.addr))
    }

    /// Mark the listener closed and wake a blocked `accept`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut local) = self.listener.local_addr() {
            if local.ip().is_unspecified() {
                local.set_ip(match local.ip() {
                    IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
                });
            }
            let _ = TcpStream::connect_timeout(&local, Duration::from_millis(200));
        }
    }
}

/// A UDP socket, optionally connected to one peer.
#[derive(Debug)]
pub struct UdpConn {
    socket: UdpSocket,
    local: String,
    remote: Option<SocketAddr>,
}

impl UdpConn {
    /// Bind to `addr` without a default peer.
    pub fn listen(addr: &str) -> Result<Self> {
        let addrs = resolve(addr, true)?;
        let socket = first_success(&addrs, |a| UdpSocket::bind(a))
            .map_err(|e| net_error("listen udp", addr, e))?;
        Ok(Self {
            local: addr_string(socket.local_addr()),
            socket,
            remote: None,
        })
    }

    /// Bind an ephemeral port and connect it to `addr`.
    pub fn dial(addr: &str) -> Result<Self> {
        let addrs = resolve(addr, false)?;
        let socket = first_success(&addrs, |remote| {
            let wildcard = match remote {
                SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
                SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
            };
            let socket = UdpSocket::bind(wildcard)?;
            socket.connect(remote)?;
            Ok((socket, *remote))
        })
        .map_err(|e| net_error("dial udp", addr, e))?;
        let (socket, remote) = socket;
        Ok(Self {
            local: addr_string(socket.local_addr()),
            socket,
            remote: Some(remote),
        })
    }

    /// Receive one datagram, returning its size and sender.
    pub fn read_from(&self, dst: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket
            .recv_from(dst)
            .map_err(|e| net_error("read udp", &self.local, e))
    }

    /// Send to `addr`. Not allowed on a connected socket.
    pub fn write_to(&self, src: &[u8], addr: &str) -> Result<usize> {
        if self.remote.is_some() {
            return Err(Error::Network(format!(
                "write udp {}: use of WriteTo with pre-connected connection",
                self.local
            )));
        }
        let target = resolve(addr, false)?;
        first_success(&target, |a| self.socket.send_to(src, a))
            .map_err(|e| net_error("write udp", addr, e))
    }

    /// Send to the connected peer.
    pub fn write(&self, src: &[u8]) -> Result<usize> {
        if self.remote.is_none() {
            return Err(Error::Network(format!(
                "write udp {}: destination address required",
                self.local
            )));
        }
        self.socket.send(src).map_err(|e| net_error("write udp", &self.remote_addr(), e))
    }

    pub fn local_addr(&self) -> &str {
        &self.local
    }

    /// Connected peer, or "" if unconnected.
    pub fn remote_addr(&self) -> String {
        self.remote.map(|a| a.to_string()).unwrap_or_default()
    }
}

unsafe fn open_export<T>(
    op: &str,
    addr: *const c_char,
    out: *mut T,
    out_err: *mut FatError,
    invalid: T,
    open: impl FnOnce(&str) -> Result<T>,
) -> Status {
    let out_err = ffi::out_err(op, out_err);
    let out = raw::out(op, out, "out");
    *out = invalid;
    let addr = raw::cstr_text(op, addr, "addr");
    let result = open(&addr);
    ffi::complete(op, out_err, result, |h| *out = h)
}

/// # Safety
///
/// `addr` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TcpDialUTF8(
    addr: *const c_char,
    out_conn: *mut FatTcpConn,
    out_err: *mut FatError,
) -> Status {
    open_export("fat_TcpDialUTF8", addr, out_conn, out_err, FatTcpConn::invalid(), |a| {
        TcpConn::dial(a).map(FatTcpConn::register)
    })
}

/// # Safety
///
/// `addr` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TcpListenerListenUTF8(
    addr: *const c_char,
    out_listener: *mut FatTcpListener,
    out_err: *mut FatError,
) -> Status {
    open_export(
        "fat_TcpListenerListenUTF8",
        addr,
        out_listener,
        out_err,
        FatTcpListener::invalid(),
        |a| TcpListen::bind(a).map(FatTcpListener::register),
    )
}

/// Blocks until a connection arrives.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TcpListenerAccept(
    l: FatTcpListener,
    out_conn: *mut FatTcpConn,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TcpListenerAccept";
    let out_err = ffi::out_err(OP, out_err);
    let out_conn = raw::out(OP, out_conn, "out_conn");
    *out_conn = FatTcpConn::invalid();
    let result = l.resolve(OP).accept();
    ffi::complete(OP, out_err, result, |conn| *out_conn = FatTcpConn::register(conn))
}

/// Local address of the listener as `host:port`.
#[no_mangle]
pub extern "C" fn fat_TcpListenerAddr(l: FatTcpListener) -> FatString {
    new_string(l.resolve("fat_TcpListenerAddr").addr())
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TcpListenerClose(l: FatTcpListener, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_TcpListenerClose";
    let out_err = ffi::out_err(OP, out_err);
    l.release(OP).close();
    ffi::complete(OP, out_err, Ok(()), |()| ())
}

/// # Safety
///
/// `dst` must be valid for writes of `len` bytes; out-pointers must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TcpConnRead(
    c: FatTcpConn,
    dst: *mut c_void,
    len: usize,
    out_n: *mut usize,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TcpConnRead";
    let out_err = ffi::out_err(OP, out_err);
    let out_n = raw::out(OP, out_n, "out_n");
    let out_eof = raw::out(OP, out_eof, "out_eof");
    *out_n = 0;
    *out_eof = false;
    let dst = raw::span_mut(OP, dst, len);
    let result = c.resolve(OP).read(dst);
    ffi::complete(OP, out_err, result, |(n, eof)| {
        *out_n = n;
        *out_eof = eof;
    })
}

/// # Safety
///
/// `src` must be valid for reads of `len` bytes; out-pointers must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TcpConnWrite(
    c: FatTcpConn,
    src: *const c_void,
    len: usize,
    out_n: *mut usize,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_TcpConnWrite";
    let out_err = ffi::out_err(OP, out_err);
    let out_n = raw::out(OP, out_n, "out_n");
    *out_n = 0;
    let src = raw::span(OP, src, len);
    let result = c.resolve(OP).write(src);
    ffi::complete(OP, out_err, result, |n| *out_n = n)
}

/// Local address as `host:port`.
#[no_mangle]
pub extern "C" fn fat_TcpConnLocalAddr(c: FatTcpConn) -> FatString {
    new_string(c.resolve("fat_TcpConnLocalAddr").local_addr())
}

/// Peer address as `host:port`.
#[no_mangle]
pub extern "C" fn fat_TcpConnRemoteAddr(c: FatTcpConn) -> FatString {
    new_string(c.resolve("fat_TcpConnRemoteAddr").remote_addr())
}

/// Shuts the connection down and releases the handle.
///
/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_TcpConnClose(c: FatTcpConn, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_TcpConnClose";
    let out_err = ffi::out_err(OP, out_err);
    let result = c.release(OP).close();
    ffi::complete(OP, out_err, result, |()| ())
}

/// # Safety
///
/// `addr` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_UdpListenUTF8(
    addr: *const c_char,
    out_conn: *mut FatUdpConn,
    out_err: *mut FatError,
) -> Status {
    open_export("fat_UdpListenUTF8", addr, out_conn, out_err, FatUdpConn::invalid(), |a| {
        UdpConn::listen(a).map(FatUdpConn::register)
    })
}

/// # Safety
///
/// `addr` must be NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_UdpDialUTF8(
    addr: *const c_char,
    out_conn: *mut FatUdpConn,
    out_err: *mut FatError,
) -> Status {
    open_export("fat_UdpDialUTF8", addr, out_conn, out_err, FatUdpConn::invalid(), |a| {
        UdpConn::dial(a).map(FatUdpConn::register)
    })
}

/// Receives one datagram into `dst` and reports the sender.
///
/// # Safety
///
/// `dst` must be valid for writes of `len` bytes; out-pointers must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_UdpConnReadFrom(
    c: FatUdpConn,
    dst: *mut c_void,
    len: usize,
    out_n: *mut usize,
    out_addr: *mut FatString,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_UdpConnReadFrom";
    let out_err = ffi::out_err(OP, out_err);
    let out_n = raw::out(OP, out_n, "out_n");
    let out_addr = raw::out(OP, out_addr, "out_addr");
    *out_n = 0;
    *out_addr = FatString::invalid();
    let dst = raw::span_mut(OP, dst, len);
    let result = c.resolve(OP).read_from(dst);
    ffi::complete(OP, out_err, result, |(n, from)| {
        *out_n = n;
        *out_addr = new_string(from.to_string());
    })
}

/// # Safety
///
/// `src` must be valid for reads of `len` bytes; `addr` must be
/// NUL-terminated; out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_UdpConnWriteToUTF8(
    c: FatUdpConn,
    src: *const c_void,
    len: usize,
    addr: *const c_char,
    out_n: *mut usize,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_UdpConnWriteToUTF8";
    let out_err = ffi::out_err(OP, out_err);
    let out_n = raw::out(OP, out_n, "out_n");
    *out_n = 0;
    let src = raw::span(OP, src, len);
    let addr = raw::cstr_text(OP, addr, "addr");
    let result = c.resolve(OP).write_to(src, &addr);
    ffi::complete(OP, out_err, result, |n| *out_n = n)
}

/// # Safety
///
/// `src` must be valid for reads of `len` bytes; out-pointers must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_UdpConnWrite(
    c: FatUdpConn,
    src: *const c_void,
    len: usize,
    out_n: *mut usize,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_UdpConnWrite";
    let out_err = ffi::out_err(OP, out_err);
    let out_n = raw::out(OP, out_n, "out_n");
    *out_n = 0;
    let src = raw::span(OP, src, len);
    let result = c.resolve(OP).write(src);
    ffi::complete(OP, out_err, result, |n| *out_n = n)
}

/// Local address as `host:port`.
#[no_mangle]
pub extern "C" fn fat_UdpConnLocalAddr(c: FatUdpConn) -> FatString {
    new_string(c.resolve("fat_UdpConnLocalAddr").local_addr())
}

/// Peer address of a dialled socket, or an empty string when unconnected.
#[no_mangle]
pub extern "C" fn fat_UdpConnRemoteAddr(c: FatUdpConn) -> FatString {
    new_string(c.resolve("fat_UdpConnRemoteAddr").remote_addr())
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_UdpConnClose(c: FatUdpConn, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_UdpConnClose";
    let out_err = ffi::out_err(OP, out_err);
    c.release(OP);
    ffi::complete(OP, out_err, Ok(()), |()| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("127.0.0.1:80").unwrap(), ("127.0.0.1", 80));
        assert_eq!(split_host_port(":8080").unwrap(), ("", 8080));
        assert_eq!(split_host_port("[::1]:9").unwrap(), ("::1", 9));
        assert_eq!(split_host_port("localhost").unwrap_err().status(), Status::Syntax);
        assert_eq!(split_host_port("::1:80").unwrap_err().status(), Status::Syntax);
        assert_eq!(split_host_port("h:http").unwrap_err().status(), Status::Syntax);
    }

    #[test]
    fn test_tcp_echo() {
        let listener = TcpListen::bind("127.0.0.1:0").unwrap();
        let addr = listener.addr().to_string();
        let server = thread::spawn(move || {
            let conn = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            let (n, _) = conn.read(&mut buf).unwrap();
            conn.write(&buf[..n]).unwrap();
            conn.close().unwrap();
        });
        let conn = TcpConn::dial(&addr).unwrap();
        assert_eq!(conn.remote_addr(), addr);
        conn.write(b"hello").unwrap();
        let mut got = Vec::new();
        let mut buf = [0u8; 8];
        loop {
            let (n, eof) = conn.read(&mut buf).unwrap();
            if eof {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"hello");
        server.join().unwrap();
    }

    #[test]
    fn test_close_wakes_accept() {
        let listener = std::sync::Arc::new(TcpListen::bind("127.0.0.1:0").unwrap());
        let waiter = std::sync::Arc::clone(&listener);
        let handle = thread::spawn(move || waiter.accept());
        thread::sleep(Duration::from_millis(50));
        listener.close();
        let err = handle.join().unwrap().unwrap_err();
        assert!(err.to_string().contains("use of closed network connection"));
    }

    #[test]
    fn test_udp_round_trip() {
        let server = UdpConn::listen("127.0.0.1:0").unwrap();
        assert_eq!(server.remote_addr(), "");
        let client = UdpConn::dial(server.local_addr()).unwrap();
        client.write(b"ping").unwrap();
        let mut buf = [0u8; 16];
        let (n, from) = server.read_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(from.to_string(), client.local_addr().replace("0.0.0.0", "127.0.0.1"));
        server.write_to(b"pong", &from.to_string()).unwrap();
        let (n, _) = client.read_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");
        assert!(client.write_to(b"x", &from.to_string()).is_err());
    }
}
