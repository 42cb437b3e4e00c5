//! Immutable byte values and the byte-slice algorithms shared with strings.
//!
//! Strings in this library are byte sequences that are conventionally, not
//! necessarily, UTF-8. The functions in this module work on raw bytes and
//! decode runes on the fly; an invalid byte decodes as U+FFFD of width one.

use std::cmp::Ordering;
use std::os::raw::{c_int, c_void};

use crate::ffi::{contract, raw, FatBytes, FatBytesArray, FatString};

/// Bytes held by a bytes handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    /// Wrap an owned vector.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Borrow the contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Bytes {
    fn from(data: &[u8]) -> Self {
        Self(data.to_vec())
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

/// Array of byte values. Elements are copied out on access.
#[derive(Debug, Clone, Default)]
pub struct BytesArray(Vec<Vec<u8>>);

impl BytesArray {
    /// Build from owned parts.
    pub fn new(parts: Vec<Vec<u8>>) -> Self {
        Self(parts)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow element `idx`.
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.0.get(idx).map(Vec::as_slice)
    }
}

pub(crate) fn to_parts(parts: Vec<&[u8]>) -> Vec<Vec<u8>> {
    parts.into_iter().map(<[u8]>::to_vec).collect()
}

// Rune decoding.

/// Decode the rune at the start of `s`.
///
/// Returns `None` for an invalid leading byte; the caller treats it as
/// U+FFFD of width one. `s` must not be empty.
pub(crate) fn decode_rune(s: &[u8]) -> Option<(char, usize)> {
    let end = s.len().min(4);
    let valid = match std::str::from_utf8(&s[..end]) {
        Ok(v) => v,
        Err(e) => std::str::from_utf8(&s[..e.valid_up_to()]).unwrap_or_default(),
    };
    valid.chars().next().map(|c| (c, c.len_utf8()))
}

/// Decode the rune that ends `s`. `None` means the last byte is invalid.
pub(crate) fn decode_last_rune(s: &[u8]) -> Option<(char, usize)> {
    let lo = s.len().saturating_sub(4);
    for start in (lo..s.len()).rev() {
        if let Some((c, n)) = decode_rune(&s[start..]) {
            if start + n == s.len() {
                return Some((c, n));
            }
        }
    }
    None
}

/// Iterate `(offset, rune, width)` over `s`, with invalid bytes as `None`.
pub(crate) fn runes(s: &[u8]) -> impl Iterator<Item = (usize, Option<char>, usize)> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= s.len() {
            return None;
        }
        let at = pos;
        let (c, n) = match decode_rune(&s[pos..]) {
            Some((c, n)) => (Some(c), n),
            None => (None, 1),
        };
        pos += n;
        Some((at, c, n))
    })
}

fn rune_or_error(c: Option<char>) -> char {
    c.unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn push_rune(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

// Searching.

/// Offset of the first occurrence of `sep` in `s`.
pub fn index(s: &[u8], sep: &[u8]) -> Option<usize> {
    if sep.is_empty() {
        return Some(0);
    }
    if sep.len() > s.len() {
        return None;
    }
    s.windows(sep.len()).position(|w| w == sep)
}

/// Offset of the first `c` in `s`.
pub fn index_byte(s: &[u8], c: u8) -> Option<usize> {
    s.iter().position(|&b| b == c)
}

/// Offset of the first rune of `s` that also appears in `chars`.
pub fn index_any(s: &[u8], chars: &[u8]) -> Option<usize> {
    if chars.is_empty() {
        return None;
    }
    let set: Vec<char> = runes(chars).map(|(_, c, _)| rune_or_error(c)).collect();
    runes(s)
        .find(|(_, c, _)| set.contains(&rune_or_error(*c)))
        .map(|(at, _, _)| at)
}

/// Whether `sub` occurs in `s`.
pub fn contains(s: &[u8], sub: &[u8]) -> bool {
    index(s, sub).is_some()
}

/// Whether any rune of `chars` occurs in `s`.
pub fn contains_any(s: &[u8], chars: &[u8]) -> bool {
    index_any(s, chars).is_some()
}

/// Number of non-overlapping occurrences of `sep`.
///
/// An empty `sep` matches before every rune and at the end.
pub fn count(s: &[u8], sep: &[u8]) -> usize {
    if sep.is_empty() {
        return runes(s).count() + 1;
    }
    let mut n = 0;
    let mut rest = s;
    while let Some(i) = index(rest, sep) {
        n += 1;
        rest = &rest[i + sep.len()..];
    }
    n
}

/// Lexicographic comparison as -1, 0 or 1.
pub fn compare(a: &[u8], b: &[u8]) -> i32 {
    match a.cmp(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Case-insensitive equality under simple Unicode case folding.
pub fn equal_fold(a: &[u8], b: &[u8]) -> bool {
    let mut ra = runes(a).map(|(_, c, _)| rune_or_error(c));
    let mut rb = runes(b).map(|(_, c, _)| rune_or_error(c));
    loop {
        match (ra.next(), rb.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) => {
                if x != y
                    && !x.to_lowercase().eq(y.to_lowercase())
                    && !x.to_uppercase().eq(y.to_uppercase())
                {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

// Trimming and cutting.

fn is_space(c: Option<char>) -> bool {
    c.is_some_and(char::is_whitespace)
}

/// `s` without leading and trailing white space.
pub fn trim_space(s: &[u8]) -> &[u8] {
    trim_func(s, is_space)
}

/// `s` without leading and trailing runes contained in `cutset`.
pub fn trim<'a>(s: &'a [u8], cutset: &[u8]) -> &'a [u8] {
    if s.is_empty() || cutset.is_empty() {
        return s;
    }
    let set: Vec<char> = runes(cutset).map(|(_, c, _)| rune_or_error(c)).collect();
    trim_func(s, |c| set.contains(&rune_or_error(c)))
}

fn trim_func(s: &[u8], pred: impl Fn(Option<char>) -> bool) -> &[u8] {
    let mut start = 0;
    while start < s.len() {
        let (c, n) = match decode_rune(&s[start..]) {
            Some((c, n)) => (Some(c), n),
            None => (None, 1),
        };
        if !pred(c) {
            break;
        }
        start += n;
    }
    let mut end = s.len();
    while end > start {
        let (c, n) = match decode_last_rune(&s[start..end]) {
            Some((c, n)) => (Some(c), n),
            None => (None, 1),
        };
        if !pred(c) {
            break;
        }
        end -= n;
    }
    &s[start..end]
}

/// `s` without `prefix`, or `s` unchanged.
pub fn trim_prefix<'a>(s: &'a [u8], prefix: &[u8]) -> &'a [u8] {
    s.strip_prefix(prefix).unwrap_or(s)
}

/// `s` without `suffix`, or `s` unchanged.
pub fn trim_suffix<'a>(s: &'a [u8], suffix: &[u8]) -> &'a [u8] {
    s.strip_suffix(suffix).unwrap_or(s)
}

/// Split around the first `sep`: `(before, after, found)`.
pub fn cut<'a>(s: &'a [u8], sep: &[u8]) -> (&'a [u8], &'a [u8], bool) {
    match index(s, sep) {
        Some(i) => (&s[..i], &s[i + sep.len()..], true),
        None => (s, &[], false),
    }
}

// Splitting and joining.

fn explode(s: &[u8], n: Option<usize>) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut rest = s;
    while !rest.is_empty() {
        if n.is_some_and(|n| out.len() + 1 == n) {
            out.push(rest);
            break;
        }
        let w = decode_rune(rest).map_or(1, |(_, w)| w);
        out.push(&rest[..w]);
        rest = &rest[w..];
    }
    out
}

/// Split `s` around every `sep`.
///
/// An empty `sep` splits after each UTF-8 sequence.
pub fn split<'a>(s: &'a [u8], sep: &[u8]) -> Vec<&'a [u8]> {
    split_n(s, sep, -1)
}

/// Split into at most `n` pieces; `n < 0` means no limit, `n == 0` gives
/// no pieces.
pub fn split_n<'a>(s: &'a [u8], sep: &[u8], n: i64) -> Vec<&'a [u8]> {
    if n == 0 {
        return Vec::new();
    }
    let limit = usize::try_from(n).ok();
    if sep.is_empty() {
        return explode(s, limit);
    }
    let mut out = Vec::new();
    let mut rest = s;
    while limit.map_or(true, |l| out.len() + 1 < l) {
        match index(rest, sep) {
            Some(i) => {
                out.push(&rest[..i]);
                rest = &rest[i + sep.len()..];
            }
            None => break,
        }
    }
    out.push(rest);
    out
}

/// Split around runs of white space, dropping empty fields.
pub fn fields(s: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (at, c, _) in runes(s) {
        match (is_space(c), start) {
            (true, Some(st)) => {
                out.push(&s[st..at]);
                start = None;
            }
            (false, None) => start = Some(at),
            _ => {}
        }
    }
    if let Some(st) = start {
        out.push(&s[st..]);
    }
    out
}

/// Concatenate `parts` with `sep` between them.
pub fn join<T: AsRef<[u8]>>(parts: &[T], sep: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            out.extend_from_slice(sep);
        }
        out.extend_from_slice(p.as_ref());
    }
    out
}

// Rewriting.

/// Replace the first `n` occurrences of `old` with `new` (`n < 0`: all).
///
/// An empty `old` matches at the start and after each rune.
pub fn replace(s: &[u8], old: &[u8], new: &[u8], n: i64) -> Vec<u8> {
    let m = count(s, old);
    if old == new || n == 0 || m == 0 {
        return s.to_vec();
    }
    let n = match usize::try_from(n) {
        Ok(n) if n < m => n,
        _ => m,
    };
    let mut out = Vec::with_capacity(s.len() + n * new.len());
    let mut start = 0;
    for i in 0..n {
        let mut j = start;
        if old.is_empty() {
            if i > 0 {
                j += decode_rune(&s[start..]).map_or(1, |(_, w)| w);
            }
        } else {
            j += index(&s[start..], old).unwrap_or(0);
        }
        out.extend_from_slice(&s[start..j]);
        out.extend_from_slice(new);
        start = j + old.len();
    }
    out.extend_from_slice(&s[start..]);
    out
}

/// `count` copies of `s`.
pub fn repeat(s: &[u8], count: usize) -> Vec<u8> {
    s.repeat(count)
}

fn map_runes(s: &[u8], f: impl Fn(char) -> char) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for (_, c, _) in runes(s) {
        push_rune(&mut out, f(rune_or_error(c)));
    }
    out
}

fn simple_lower(c: char) -> char {
    let mut it = c.to_lowercase();
    match (it.next(), it.next()) {
        (Some(l), None) => l,
        _ => c,
    }
}

fn simple_upper(c: char) -> char {
    let mut it = c.to_uppercase();
    match (it.next(), it.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

/// Lower-case every rune.
pub fn to_lower(s: &[u8]) -> Vec<u8> {
    if s.is_ascii() {
        return s.to_ascii_lowercase();
    }
    map_runes(s, simple_lower)
}

/// Upper-case every rune.
pub fn to_upper(s: &[u8]) -> Vec<u8> {
    if s.is_ascii() {
        return s.to_ascii_uppercase();
    }
    map_runes(s, simple_upper)
}

/// Replace each run of invalid UTF-8 with `replacement`.
pub fn to_valid_utf8(s: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut in_invalid = false;
    for (at, c, w) in runes(s) {
        if c.is_some() {
            out.extend_from_slice(&s[at..at + w]);
            in_invalid = false;
        } else if !in_invalid {
            out.extend_from_slice(replacement);
            in_invalid = true;
        }
    }
    out
}

fn found_index(i: Option<usize>) -> c_int {
    i.map_or(-1, |i| i as c_int)
}

// Exports.

fn new_bytes(data: impl Into<Vec<u8>>) -> FatBytes {
    FatBytes::register(Bytes(data.into()))
}

fn new_array(parts: Vec<&[u8]>) -> FatBytesArray {
    FatBytesArray::register(BytesArray(to_parts(parts)))
}

/// Creates a byte value from a caller span (embedded NULs preserved).
///
/// # Safety
///
/// `bytes` must be valid for reads of `len` bytes (NULL only if `len == 0`).
#[no_mangle]
pub unsafe extern "C" fn fat_BytesNewN(bytes: *const c_void, len: usize) -> FatBytes {
    new_bytes(raw::span("fat_BytesNewN", bytes, len))
}

/// Length in bytes.
#[no_mangle]
pub extern "C" fn fat_BytesLen(b: FatBytes) -> usize {
    b.resolve("fat_BytesLen").0.len()
}

/// Copies up to `dst_len` bytes into `dst`, returning the count.
///
/// # Safety
///
/// `dst` must be valid for writes of `dst_len` bytes (NULL only if 0).
#[no_mangle]
pub unsafe extern "C" fn fat_BytesCopyOut(b: FatBytes, dst: *mut c_void, dst_len: usize) -> usize {
    const OP: &str = "fat_BytesCopyOut";
    let b = b.resolve(OP);
    raw::copy_out(&b.0, raw::span_mut(OP, dst, dst_len))
}

/// Independent copy of `b`.
#[no_mangle]
pub extern "C" fn fat_BytesClone(b: FatBytes) -> FatBytes {
    let b = b.resolve("fat_BytesClone");
    new_bytes(b.0.clone())
}

/// Releases the byte value.
#[no_mangle]
pub extern "C" fn fat_BytesFree(b: FatBytes) {
    b.release("fat_BytesFree");
}

/// Reports whether `subslice` occurs in `b`.
#[no_mangle]
pub extern "C" fn fat_BytesContains(b: FatBytes, subslice: FatBytes) -> bool {
    const OP: &str = "fat_BytesContains";
    contains(&b.resolve(OP).0, &subslice.resolve(OP).0)
}

/// Reports whether `s` begins with `prefix`.
#[no_mangle]
pub extern "C" fn fat_BytesHasPrefix(s: FatBytes, prefix: FatBytes) -> bool {
    const OP: &str = "fat_BytesHasPrefix";
    s.resolve(OP).0.starts_with(&prefix.resolve(OP).0)
}

/// Reports whether `s` ends with `suffix`.
#[no_mangle]
pub extern "C" fn fat_BytesHasSuffix(s: FatBytes, suffix: FatBytes) -> bool {
    const OP: &str = "fat_BytesHasSuffix";
    s.resolve(OP).0.ends_with(&suffix.resolve(OP).0)
}

/// Strips leading and trailing Unicode white space.
#[no_mangle]
pub extern "C" fn fat_BytesTrimSpace(s: FatBytes) -> FatBytes {
    new_bytes(trim_space(&s.resolve("fat_BytesTrimSpace").0))
}

/// Trims leading and trailing runes contained in the string `cutset`.
#[no_mangle]
pub extern "C" fn fat_BytesTrim(s: FatBytes, cutset: FatString) -> FatBytes {
    const OP: &str = "fat_BytesTrim";
    new_bytes(trim(&s.resolve(OP).0, cutset.resolve(OP).as_bytes()))
}

/// Removes `prefix` once if present.
#[no_mangle]
pub extern "C" fn fat_BytesTrimPrefix(s: FatBytes, prefix: FatBytes) -> FatBytes {
    const OP: &str = "fat_BytesTrimPrefix";
    new_bytes(trim_prefix(&s.resolve(OP).0, &prefix.resolve(OP).0))
}

/// Removes `suffix` once if present.
#[no_mangle]
pub extern "C" fn fat_BytesTrimSuffix(s: FatBytes, suffix: FatBytes) -> FatBytes {
    const OP: &str = "fat_BytesTrimSuffix";
    new_bytes(trim_suffix(&s.resolve(OP).0, &suffix.resolve(OP).0))
}

/// Splits around the first `sep`. Both halves are always returned as new
/// handles; when `sep` is absent `before` is a copy of `s` and `after` is
/// empty.
///
/// # Safety
///
/// `out_before` and `out_after` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_BytesCut(
    s: FatBytes,
    sep: FatBytes,
    out_before: *mut FatBytes,
    out_after: *mut FatBytes,
) -> bool {
    const OP: &str = "fat_BytesCut";
    let out_before = raw::out(OP, out_before, "out_before");
    let out_after = raw::out(OP, out_after, "out_after");
    let s = s.resolve(OP);
    let sep = sep.resolve(OP);
    let (before, after, found) = cut(&s.0, &sep.0);
    *out_before = new_bytes(before);
    *out_after = new_bytes(after);
    found
}

/// # Safety
///
/// `out_after` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_BytesCutPrefix(
    s: FatBytes,
    prefix: FatBytes,
    out_after: *mut FatBytes,
) -> bool {
    const OP: &str = "fat_BytesCutPrefix";
    let out_after = raw::out(OP, out_after, "out_after");
    let s = s.resolve(OP);
    let prefix = prefix.resolve(OP);
    match s.0.strip_prefix(prefix.0.as_slice()) {
        Some(rest) => {
            *out_after = new_bytes(rest);
            true
        }
        None => {
            *out_after = new_bytes(s.0.clone());
            false
        }
    }
}

/// # Safety
///
/// `out_before` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_BytesCutSuffix(
    s: FatBytes,
    suffix: FatBytes,
    out_before: *mut FatBytes,
) -> bool {
    const OP: &str = "fat_BytesCutSuffix";
    let out_before = raw::out(OP, out_before, "out_before");
    let s = s.resolve(OP);
    let suffix = suffix.resolve(OP);
    match s.0.strip_suffix(suffix.0.as_slice()) {
        Some(rest) => {
            *out_before = new_bytes(rest);
            true
        }
        None => {
            *out_before = new_bytes(s.0.clone());
            false
        }
    }
}

/// Splits around every `sep`; an empty separator splits after each UTF-8 sequence.
#[no_mangle]
pub extern "C" fn fat_BytesSplit(s: FatBytes, sep: FatBytes) -> FatBytesArray {
    const OP: &str = "fat_BytesSplit";
    let s = s.resolve(OP);
    let sep = sep.resolve(OP);
    new_array(split(&s.0, &sep.0))
}

/// Splits around runs of white space.
#[no_mangle]
pub extern "C" fn fat_BytesFields(s: FatBytes) -> FatBytesArray {
    let s = s.resolve("fat_BytesFields");
    new_array(fields(&s.0))
}

/// Concatenates the array elements with `sep` between them.
#[no_mangle]
pub extern "C" fn fat_BytesJoin(s: FatBytesArray, sep: FatBytes) -> FatBytes {
    const OP: &str = "fat_BytesJoin";
    new_bytes(join(&s.resolve(OP).0, &sep.resolve(OP).0))
}

/// Replaces the first `n` occurrences of `old_value` (all when `n < 0`).
#[no_mangle]
pub extern "C" fn fat_BytesReplace(
    s: FatBytes,
    old_value: FatBytes,
    new_value: FatBytes,
    n: c_int,
) -> FatBytes {
    const OP: &str = "fat_BytesReplace";
    let out = replace(
        &s.resolve(OP).0,
        &old_value.resolve(OP).0,
        &new_value.resolve(OP).0,
        i64::from(n),
    );
    new_bytes(out)
}

/// Replaces every occurrence of `old_value`.
#[no_mangle]
pub extern "C" fn fat_BytesReplaceAll(
    s: FatBytes,
    old_value: FatBytes,
    new_value: FatBytes,
) -> FatBytes {
    const OP: &str = "fat_BytesReplaceAll";
    let out = replace(&s.resolve(OP).0, &old_value.resolve(OP).0, &new_value.resolve(OP).0, -1);
    new_bytes(out)
}

/// Returns `count` copies of `s`. A negative count is fatal.
#[no_mangle]
pub extern "C" fn fat_BytesRepeat(s: FatBytes, count: c_int) -> FatBytes {
    const OP: &str = "fat_BytesRepeat";
    let s = s.resolve(OP);
    let count = contract::index(OP, count as isize, "count");
    new_bytes(repeat(&s.0, count))
}

/// Unicode lower-case copy.
#[no_mangle]
pub extern "C" fn fat_BytesToLower(s: FatBytes) -> FatBytes {
    new_bytes(to_lower(&s.resolve("fat_BytesToLower").0))
}

/// Unicode upper-case copy.
#[no_mangle]
pub extern "C" fn fat_BytesToUpper(s: FatBytes) -> FatBytes {
    new_bytes(to_upper(&s.resolve("fat_BytesToUpper").0))
}

/// Replaces each run of invalid UTF-8 with `replacement`.
#[no_mangle]
pub extern "C" fn fat_BytesToValidUTF8(s: FatBytes, replacement: FatBytes) -> FatBytes {
    const OP: &str = "fat_BytesToValidUTF8";
    new_bytes(to_valid_utf8(&s.resolve(OP).0, &replacement.resolve(OP).0))
}

/// Returns the offset of the first `sep`, or -1.
#[no_mangle]
pub extern "C" fn fat_BytesIndex(s: FatBytes, sep: FatBytes) -> c_int {
    const OP: &str = "fat_BytesIndex";
    found_index(index(&s.resolve(OP).0, &sep.resolve(OP).0))
}

/// Index of the first `c`, or -1.
#[no_mangle]
pub extern "C" fn fat_BytesIndexByte(s: FatBytes, c: u8) -> c_int {
    found_index(index_byte(&s.resolve("fat_BytesIndexByte").0, c))
}

/// Returns the offset of the first rune of `s` found in the string `chars`, or -1.
#[no_mangle]
pub extern "C" fn fat_BytesIndexAny(s: FatBytes, chars: FatString) -> c_int {
    const OP: &str = "fat_BytesIndexAny";
    found_index(index_any(&s.resolve(OP).0, chars.resolve(OP).as_bytes()))
}

/// Non-overlapping occurrences of `sep`; an empty `sep` counts runes plus one.
#[no_mangle]
pub extern "C" fn fat_BytesCount(s: FatBytes, sep: FatBytes) -> c_int {
    const OP: &str = "fat_BytesCount";
    count(&s.resolve(OP).0, &sep.resolve(OP).0) as c_int
}

/// Lexicographic comparison: -1, 0 or 1.
#[no_mangle]
pub extern "C" fn fat_BytesCompare(a: FatBytes, b: FatBytes) -> c_int {
    const OP: &str = "fat_BytesCompare";
    compare(&a.resolve(OP).0, &b.resolve(OP).0)
}

/// Reports whether both values hold the same bytes.
#[no_mangle]
pub extern "C" fn fat_BytesEqual(a: FatBytes, b: FatBytes) -> bool {
    const OP: &str = "fat_BytesEqual";
    a.resolve(OP).0 == b.resolve(OP).0
}

/// Number of elements.
#[no_mangle]
pub extern "C" fn fat_BytesArrayLen(a: FatBytesArray) -> usize {
    a.resolve("fat_BytesArrayLen").len()
}

/// Returns element `idx` as a new, independently owned handle.
///
/// An out-of-range index is fatal.
#[no_mangle]
pub extern "C" fn fat_BytesArrayGet(a: FatBytesArray, idx: usize) -> FatBytes {
    const OP: &str = "fat_BytesArrayGet";
    let a = a.resolve(OP);
    match a.get(idx) {
        Some(part) => new_bytes(part),
        None => contract::violation(
            OP,
            format_args!("index {} out of range (len {})", idx, a.len()),
        ),
    }
}

/// Frees the array. Values taken out with `fat_BytesArrayGet` stay live.
#[no_mangle]
pub extern "C" fn fat_BytesArrayFree(a: FatBytesArray) {
    a.release("fat_BytesArrayFree");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(parts: Vec<&[u8]>) -> Vec<String> {
        parts
            .into_iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect()
    }

    #[test]
    fn test_index_and_count() {
        assert_eq!(index(b"chicken", b"ken"), Some(4));
        assert_eq!(index(b"chicken", b"dmr"), None);
        assert_eq!(index(b"abc", b""), Some(0));
        assert_eq!(count(b"cheese", b"e"), 3);
        assert_eq!(count("five".as_bytes(), b""), 5);
        assert_eq!(count("héllo".as_bytes(), b""), 6);
        assert_eq!(index_any("golang".as_bytes(), "xyzn".as_bytes()), Some(4));
        assert_eq!(index_any(b"abc", b""), None);
    }

    #[test]
    fn test_split_variants() {
        assert_eq!(strs(split(b"a,b,c", b",")), vec!["a", "b", "c"]);
        assert_eq!(strs(split(b"a man a plan", b"a ")), vec!["", "man ", "plan"]);
        assert_eq!(strs(split(b" xyz ", b"")), vec![" ", "x", "y", "z", " "]);
        assert_eq!(strs(split(b"", b",")), vec![""]);
        assert_eq!(strs(split_n(b"a,b,c,d", b",", 2)), vec!["a", "b,c,d"]);
        assert!(split_n(b"a,b", b",", 0).is_empty());
        assert_eq!(strs(split_n(b"abc", b"", 2)), vec!["a", "bc"]);
    }

    #[test]
    fn test_fields() {
        assert_eq!(strs(fields(b"  foo bar  baz   ")), vec!["foo", "bar", "baz"]);
        assert!(fields(b"   ").is_empty());
    }

    #[test]
    fn test_trim_family() {
        assert_eq!(trim_space(b" \t\n Hello, Gophers \n\t\r\n"), b"Hello, Gophers");
        assert_eq!(trim(b"!!!Hello, Gophers!!!", b"!"), b"Hello, Gophers");
        assert_eq!(trim(b"xx", b""), b"xx");
        assert_eq!(trim_prefix(b"Goodbye", b"Good"), b"bye");
        assert_eq!(trim_suffix(b"Goodbye", b"Good"), b"Goodbye");
        assert_eq!(trim_space("\u{a0}x\u{3000}".as_bytes()), b"x");
    }

    #[test]
    fn test_cut() {
        assert_eq!(cut(b"key=value", b"="), (&b"key"[..], &b"value"[..], true));
        assert_eq!(cut(b"novalue", b"="), (&b"novalue"[..], &b""[..], false));
    }

    #[test]
    fn test_replace() {
        assert_eq!(replace(b"oink oink oink", b"k", b"ky", 2), b"oinky oinky oink");
        assert_eq!(replace(b"oink oink oink", b"oink", b"moo", -1), b"moo moo moo");
        assert_eq!(replace(b"abc", b"", b"-", -1), b"-a-b-c-");
        assert_eq!(replace(b"abc", b"x", b"y", -1), b"abc");
    }

    #[test]
    fn test_case_and_validity() {
        assert_eq!(to_upper(b"Gopher"), b"GOPHER");
        assert_eq!(to_lower("ÀB".as_bytes()), "àb".as_bytes());
        assert_eq!(to_valid_utf8(b"a\xff\xfeb\xffc", b"?"), b"a?b?c");
        assert!(equal_fold(b"Go", b"GO"));
        assert!(!equal_fold(b"Go", b"Gopher"));
    }

    #[test]
    fn test_join_and_compare() {
        let parts: Vec<Vec<u8>> = vec![b"foo".to_vec(), b"bar".to_vec(), b"baz".to_vec()];
        assert_eq!(join(&parts, b", "), b"foo, bar, baz");
        assert_eq!(compare(b"a", b"b"), -1);
        assert_eq!(compare(b"b", b"b"), 0);
        assert_eq!(compare(b"c", b"b"), 1);
    }

    #[test]
    fn test_decode_last_rune() {
        assert_eq!(decode_last_rune("aé".as_bytes()), Some(('é', 2)));
        assert_eq!(decode_last_rune(b"a\xff"), None);
    }
}
