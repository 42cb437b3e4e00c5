//! Immutable string values.
//!
//! A string is a byte sequence that is conventionally UTF-8; invalid bytes
//! and embedded NULs are preserved. The algorithms are the byte-slice ones
//! from [`crate::bytes`].

use std::os::raw::{c_char, c_int, c_void};

use crate::bytes;
use crate::ffi::{contract, raw, FatString, FatStringArray};

/// Text held by a string handle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Text(Vec<u8>);

impl Text {
    /// Wrap owned bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Borrow as `str`, replacing invalid UTF-8.
    pub fn to_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    /// Take the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Text {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&[u8]> for Text {
    fn from(s: &[u8]) -> Self {
        Self(s.to_vec())
    }
}

impl From<Vec<u8>> for Text {
    fn from(s: Vec<u8>) -> Self {
        Self(s)
    }
}

/// Array of strings. Elements are copied out on access.
#[derive(Debug, Clone, Default)]
pub struct TextArray(Vec<Vec<u8>>);

impl TextArray {
    /// Build from owned parts.
    pub fn new(parts: Vec<Vec<u8>>) -> Self {
        Self(parts)
    }

    /// Build from string slices.
    pub fn from_strs<S: AsRef<str>>(parts: &[S]) -> Self {
        Self(parts.iter().map(|s| s.as_ref().as_bytes().to_vec()).collect())
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

pub(crate) fn new_string(data: impl Into<Text>) -> FatString {
    FatString::register(data.into())
}

fn new_array(parts: Vec<&[u8]>) -> FatStringArray {
    FatStringArray::register(TextArray(bytes::to_parts(parts)))
}

fn found_index(i: Option<usize>) -> c_int {
    i.map_or(-1, |i| i as c_int)
}

/// Creates a string from a NUL-terminated C string.
///
/// # Safety
///
/// `cstr` must point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn fat_StringNewUTF8(cstr: *const c_char) -> FatString {
    new_string(raw::cstr("fat_StringNewUTF8", cstr, "cstr"))
}

/// Creates a string from an explicit span; embedded NULs are kept.
///
/// # Safety
///
/// `bytes` must be valid for reads of `len` bytes (NULL only if `len == 0`).
#[no_mangle]
pub unsafe extern "C" fn fat_StringNewUTF8N(bytes: *const c_char, len: usize) -> FatString {
    new_string(raw::span("fat_StringNewUTF8N", bytes as *const c_void, len))
}

/// Independent copy of `s`.
#[no_mangle]
pub extern "C" fn fat_StringClone(s: FatString) -> FatString {
    let s = s.resolve("fat_StringClone");
    new_string(s.as_bytes())
}

/// Releases the string.
#[no_mangle]
pub extern "C" fn fat_StringFree(s: FatString) {
    s.release("fat_StringFree");
}

/// Length in bytes.
#[no_mangle]
pub extern "C" fn fat_StringLen(s: FatString) -> usize {
    s.resolve("fat_StringLen").as_bytes().len()
}

/// Copies up to `dst_len` bytes into `dst`; no terminator is written.
///
/// # Safety
///
/// `dst` must be valid for writes of `dst_len` bytes (NULL only if 0).
#[no_mangle]
pub unsafe extern "C" fn fat_StringCopyOut(
    s: FatString,
    dst: *mut c_void,
    dst_len: usize,
) -> usize {
    const OP: &str = "fat_StringCopyOut";
    let s = s.resolve(OP);
    raw::copy_out(s.as_bytes(), raw::span_mut(OP, dst, dst_len))
}

/// Copies into `dst` as a NUL-terminated string, truncating to
/// `dst_len - 1` bytes. Returns the bytes copied, excluding the NUL.
///
/// # Safety
///
/// `dst` must be valid for writes of `dst_len` bytes (NULL only if 0).
#[no_mangle]
pub unsafe extern "C" fn fat_StringCopyOutCStr(
    s: FatString,
    dst: *mut c_char,
    dst_len: usize,
) -> usize {
    const OP: &str = "fat_StringCopyOutCStr";
    let s = s.resolve(OP);
    raw::copy_out_cstr(s.as_bytes(), raw::span_mut(OP, dst as *mut c_void, dst_len))
}

/// Reports whether `substr` occurs in `s`.
#[no_mangle]
pub extern "C" fn fat_StringContains(s: FatString, substr: FatString) -> bool {
    const OP: &str = "fat_StringContains";
    bytes::contains(s.resolve(OP).as_bytes(), substr.resolve(OP).as_bytes())
}

/// Reports whether any character of `chars` occurs in `s`.
#[no_mangle]
pub extern "C" fn fat_StringContainsAny(s: FatString, chars: FatString) -> bool {
    const OP: &str = "fat_StringContainsAny";
    bytes::contains_any(s.resolve(OP).as_bytes(), chars.resolve(OP).as_bytes())
}

/// Reports whether `s` begins with `prefix`.
#[no_mangle]
pub extern "C" fn fat_StringHasPrefix(s: FatString, prefix: FatString) -> bool {
    const OP: &str = "fat_StringHasPrefix";
    s.resolve(OP).as_bytes().starts_with(prefix.resolve(OP).as_bytes())
}

/// Reports whether `s` ends with `suffix`.
#[no_mangle]
pub extern "C" fn fat_StringHasSuffix(s: FatString, suffix: FatString) -> bool {
    const OP: &str = "fat_StringHasSuffix";
    s.resolve(OP).as_bytes().ends_with(suffix.resolve(OP).as_bytes())
}

/// Strips leading and trailing Unicode white space.
#[no_mangle]
pub extern "C" fn fat_StringTrimSpace(s: FatString) -> FatString {
    new_string(bytes::trim_space(s.resolve("fat_StringTrimSpace").as_bytes()))
}

/// Strips leading and trailing characters contained in `cutset`.
#[no_mangle]
pub extern "C" fn fat_StringTrim(s: FatString, cutset: FatString) -> FatString {
    const OP: &str = "fat_StringTrim";
    new_string(bytes::trim(s.resolve(OP).as_bytes(), cutset.resolve(OP).as_bytes()))
}

/// Removes `prefix` once if present.
#[no_mangle]
pub extern "C" fn fat_StringTrimPrefix(s: FatString, prefix: FatString) -> FatString {
    const OP: &str = "fat_StringTrimPrefix";
    new_string(bytes::trim_prefix(s.resolve(OP).as_bytes(), prefix.resolve(OP).as_bytes()))
}

/// Removes `suffix` once if present.
#[no_mangle]
pub extern "C" fn fat_StringTrimSuffix(s: FatString, suffix: FatString) -> FatString {
    const OP: &str = "fat_StringTrimSuffix";
    new_string(bytes::trim_suffix(s.resolve(OP).as_bytes(), suffix.resolve(OP).as_bytes()))
}

/// Splits around the first `sep`; both halves are new handles.
///
/// # Safety
///
/// `out_before` and `out_after` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_StringCut(
    s: FatString,
    sep: FatString,
    out_before: *mut FatString,
    out_after: *mut FatString,
) -> bool {
    const OP: &str = "fat_StringCut";
    let out_before = raw::out(OP, out_before, "out_before");
    let out_after = raw::out(OP, out_after, "out_after");
    let s = s.resolve(OP);
    let sep = sep.resolve(OP);
    let (before, after, found) = bytes::cut(s.as_bytes(), sep.as_bytes());
    *out_before = new_string(before);
    *out_after = new_string(after);
    found
}

/// # Safety
///
/// `out_after` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_StringCutPrefix(
    s: FatString,
    prefix: FatString,
    out_after: *mut FatString,
) -> bool {
    const OP: &str = "fat_StringCutPrefix";
    let out_after = raw::out(OP, out_after, "out_after");
    let s = s.resolve(OP);
    let prefix = prefix.resolve(OP);
    let (rest, found) = match s.as_bytes().strip_prefix(prefix.as_bytes()) {
        Some(rest) => (rest, true),
        None => (s.as_bytes(), false),
    };
    *out_after = new_string(rest);
    found
}

/// # Safety
///
/// `out_before` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_StringCutSuffix(
    s: FatString,
    suffix: FatString,
    out_before: *mut FatString,
) -> bool {
    const OP: &str = "fat_StringCutSuffix";
    let out_before = raw::out(OP, out_before, "out_before");
    let s = s.resolve(OP);
    let suffix = suffix.resolve(OP);
    let (rest, found) = match s.as_bytes().strip_suffix(suffix.as_bytes()) {
        Some(rest) => (rest, true),
        None => (s.as_bytes(), false),
    };
    *out_before = new_string(rest);
    found
}

/// Splits around every `sep`; an empty separator splits into characters.
#[no_mangle]
pub extern "C" fn fat_StringSplit(s: FatString, sep: FatString) -> FatStringArray {
    const OP: &str = "fat_StringSplit";
    let s = s.resolve(OP);
    let sep = sep.resolve(OP);
    new_array(bytes::split(s.as_bytes(), sep.as_bytes()))
}

/// Splits into at most `n` pieces (`n < 0`: unlimited, `n == 0`: none).
#[no_mangle]
pub extern "C" fn fat_StringSplitN(s: FatString, sep: FatString, n: c_int) -> FatStringArray {
    const OP: &str = "fat_StringSplitN";
    let s = s.resolve(OP);
    let sep = sep.resolve(OP);
    new_array(bytes::split_n(s.as_bytes(), sep.as_bytes(), i64::from(n)))
}

/// Splits around runs of white space.
#[no_mangle]
pub extern "C" fn fat_StringFields(s: FatString) -> FatStringArray {
    let s = s.resolve("fat_StringFields");
    new_array(bytes::fields(s.as_bytes()))
}

/// Concatenates the array elements with `sep` between them.
#[no_mangle]
pub extern "C" fn fat_StringJoin(elems: FatStringArray, sep: FatString) -> FatString {
    const OP: &str = "fat_StringJoin";
    new_string(bytes::join(&elems.resolve(OP).0, sep.resolve(OP).as_bytes()))
}

/// Replaces the first `n` occurrences of `old_value` (all when `n < 0`).
#[no_mangle]
pub extern "C" fn fat_StringReplace(
    s: FatString,
    old_value: FatString,
    new_value: FatString,
    n: c_int,
) -> FatString {
    const OP: &str = "fat_StringReplace";
    new_string(bytes::replace(
        s.resolve(OP).as_bytes(),
        old_value.resolve(OP).as_bytes(),
        new_value.resolve(OP).as_bytes(),
        i64::from(n),
    ))
}

/// Replaces every occurrence of `old_value`.
#[no_mangle]
pub extern "C" fn fat_StringReplaceAll(
    s: FatString,
    old_value: FatString,
    new_value: FatString,
) -> FatString {
    const OP: &str = "fat_StringReplaceAll";
    new_string(bytes::replace(
        s.resolve(OP).as_bytes(),
        old_value.resolve(OP).as_bytes(),
        new_value.resolve(OP).as_bytes(),
        -1,
    ))
}

/// Returns `count` copies of `s`. A negative count is fatal.
#[no_mangle]
pub extern "C" fn fat_StringRepeat(s: FatString, count: c_int) -> FatString {
    const OP: &str = "fat_StringRepeat";
    let s = s.resolve(OP);
    let count = contract::index(OP, count as isize, "count");
    new_string(bytes::repeat(s.as_bytes(), count))
}

/// Unicode lower-case copy.
#[no_mangle]
pub extern "C" fn fat_StringToLower(s: FatString) -> FatString {
    new_string(bytes::to_lower(s.resolve("fat_StringToLower").as_bytes()))
}

/// Unicode upper-case copy.
#[no_mangle]
pub extern "C" fn fat_StringToUpper(s: FatString) -> FatString {
    new_string(bytes::to_upper(s.resolve("fat_StringToUpper").as_bytes()))
}

/// Replaces each run of invalid UTF-8 with `replacement`.
#[no_mangle]
pub extern "C" fn fat_StringToValidUTF8(s: FatString, replacement: FatString) -> FatString {
    const OP: &str = "fat_StringToValidUTF8";
    new_string(bytes::to_valid_utf8(s.resolve(OP).as_bytes(), replacement.resolve(OP).as_bytes()))
}

/// Byte index of the first `substr`, or -1.
#[no_mangle]
pub extern "C" fn fat_StringIndex(s: FatString, substr: FatString) -> c_int {
    const OP: &str = "fat_StringIndex";
    found_index(bytes::index(s.resolve(OP).as_bytes(), substr.resolve(OP).as_bytes()))
}

/// Byte index of the first character from `chars`, or -1.
#[no_mangle]
pub extern "C" fn fat_StringIndexAny(s: FatString, chars: FatString) -> c_int {
    const OP: &str = "fat_StringIndexAny";
    found_index(bytes::index_any(s.resolve(OP).as_bytes(), chars.resolve(OP).as_bytes()))
}

/// Non-overlapping occurrences of `substr`; an empty `substr` counts characters plus one.
#[no_mangle]
pub extern "C" fn fat_StringCount(s: FatString, substr: FatString) -> c_int {
    const OP: &str = "fat_StringCount";
    bytes::count(s.resolve(OP).as_bytes(), substr.resolve(OP).as_bytes()) as c_int
}

/// Lexicographic comparison: -1, 0 or 1.
#[no_mangle]
pub extern "C" fn fat_StringCompare(a: FatString, b: FatString) -> c_int {
    const OP: &str = "fat_StringCompare";
    bytes::compare(a.resolve(OP).as_bytes(), b.resolve(OP).as_bytes())
}

/// Reports whether both strings hold the same bytes.
#[no_mangle]
pub extern "C" fn fat_StringEqual(a: FatString, b: FatString) -> bool {
    const OP: &str = "fat_StringEqual";
    a.resolve(OP).as_bytes() == b.resolve(OP).as_bytes()
}

/// Case-insensitive comparison under simple Unicode folding.
#[no_mangle]
pub extern "C" fn fat_StringEqualFold(a: FatString, b: FatString) -> bool {
    const OP: &str = "fat_StringEqualFold";
    bytes::equal_fold(a.resolve(OP).as_bytes(), b.resolve(OP).as_bytes())
}

/// Number of elements.
#[no_mangle]
pub extern "C" fn fat_StringArrayLen(a: FatStringArray) -> usize {
    a.resolve("fat_StringArrayLen").len()
}

/// Returns element `idx` as a new string handle. Out of range is fatal.
#[no_mangle]
pub extern "C" fn fat_StringArrayGet(a: FatStringArray, idx: usize) -> FatString {
    const OP: &str = "fat_StringArrayGet";
    let a = a.resolve(OP);
    match a.get(idx) {
        Some(part) => new_string(part),
        None => contract::violation(
            OP,
            format_args!("index {} out of range (len {})", idx, a.len()),
        ),
    }
}

/// Frees the array. Strings taken out with `fat_StringArrayGet` stay live.
#[no_mangle]
pub extern "C" fn fat_StringArrayFree(a: FatStringArray) {
    a.release("fat_StringArrayFree");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(h: FatString) -> Vec<u8> {
        let v = h.resolve("test").as_bytes().to_vec();
        fat_StringFree(h);
        v
    }

    fn s(v: &str) -> FatString {
        new_string(v)
    }

    #[test]
    fn test_embedded_nul_is_preserved() {
        let h = unsafe { fat_StringNewUTF8N(b"a\0b".as_ptr() as *const c_char, 3) };
        assert_eq!(fat_StringLen(h), 3);
        assert_eq!(text(h), b"a\0b");
    }

    #[test]
    fn test_copy_out_cstr_truncates() {
        let h = s("hello");
        let mut dst = [0xffu8; 4];
        let n = unsafe { fat_StringCopyOutCStr(h, dst.as_mut_ptr() as *mut c_char, dst.len()) };
        assert_eq!(n, 3);
        assert_eq!(&dst, b"hel\0");
        fat_StringFree(h);
    }

    #[test]
    fn test_split_n_and_join() {
        let src = s("a,b,c");
        let sep = s(",");
        let parts = fat_StringSplitN(src, sep, 2);
        assert_eq!(fat_StringArrayLen(parts), 2);
        assert_eq!(text(fat_StringArrayGet(parts, 1)), b"b,c");
        let dash = s("-");
        assert_eq!(text(fat_StringJoin(parts, dash)), b"a-b,c");
        fat_StringArrayFree(parts);
        for h in [src, sep, dash] {
            fat_StringFree(h);
        }
    }

    #[test]
    fn test_cut_prefix() {
        let src = s("prefix-rest");
        let pre = s("prefix-");
        let mut after = FatString::invalid();
        assert!(unsafe { fat_StringCutPrefix(src, pre, &mut after) });
        assert_eq!(text(after), b"rest");
        fat_StringFree(src);
        fat_StringFree(pre);
    }

    #[test]
    fn test_equal_fold_and_index() {
        let a = s("Gopher");
        let b = s("GOPHER");
        assert!(fat_StringEqualFold(a, b));
        assert!(!fat_StringEqual(a, b));
        let sub = s("ph");
        assert_eq!(fat_StringIndex(a, sub), 2);
        for h in [a, b, sub] {
            fat_StringFree(h);
        }
    }
}
