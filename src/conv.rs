//! Conversions between numbers, booleans and their text forms, plus
//! quoting and unquoting of string literals.
//!
//! Formatting follows the classic `strconv` rules: `%e`/`%f`/`%g` with the
//! two-digit minimum exponent, shortest round-trip output for precision -1,
//! and `b`/`x` binary-exponent forms. Parse errors carry messages of the
//! form `strconv.ParseInt: parsing "abc": invalid syntax`.

use std::os::raw::c_int;

use crate::bytes::{self, Bytes};
use crate::error::{Error, Result};
use crate::ffi::{self, contract, raw, FatBytes, FatError, FatString};
use crate::string::new_string;
use crate::types::Status;

/// Size of the native `int` in bits.
pub const INT_SIZE: u32 = usize::BITS;

const LOWER_HEX: &[u8; 16] = b"0123456789abcdef";
const UPPER_HEX: &[u8; 16] = b"0123456789ABCDEF";
const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// Errors.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumErr {
    Syntax,
    Range,
    Base(i32),
    BitSize(i32),
}

fn num_error(func: &str, input: &[u8], kind: NumErr) -> Error {
    let quoted = String::from_utf8_lossy(&quote(input)).into_owned();
    let prefix = format!("strconv.{}: parsing {}: ", func, quoted);
    match kind {
        NumErr::Syntax => Error::syntax(prefix + "invalid syntax"),
        NumErr::Range => Error::range(prefix + "value out of range"),
        NumErr::Base(b) => Error::other(format!("{}invalid base {}", prefix, b)),
        NumErr::BitSize(b) => Error::other(format!("{}invalid bit size {}", prefix, b)),
    }
}

fn plain_syntax() -> Error {
    Error::syntax("invalid syntax")
}

// Integers.

/// Format `u` in `base` (2..=36) with lower-case digits.
pub fn format_uint(mut u: u64, base: u32) -> String {
    if u == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::with_capacity(64);
    while u > 0 {
        buf.push(DIGITS[(u % base as u64) as usize]);
        u /= base as u64;
    }
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

/// Format `i` in `base` (2..=36).
pub fn format_int(i: i64, base: u32) -> String {
    let digits = format_uint(i.unsigned_abs(), base);
    if i < 0 {
        format!("-{}", digits)
    } else {
        digits
    }
}

fn underscore_ok(s: &[u8]) -> bool {
    let mut saw = b'^';
    let mut s = s;
    if let Some((&c, rest)) = s.split_first() {
        if c == b'-' || c == b'+' {
            s = rest;
        }
    }
    let mut i = 0;
    let mut hex = false;
    if s.len() >= 2 && s[0] == b'0' && matches!(s[1].to_ascii_lowercase(), b'b' | b'o' | b'x') {
        i = 2;
        saw = b'0';
        hex = s[1].to_ascii_lowercase() == b'x';
    }
    while i < s.len() {
        let c = s[i];
        i += 1;
        if c.is_ascii_digit() || (hex && c.is_ascii_hexdigit()) {
            saw = b'0';
            continue;
        }
        if c == b'_' {
            if saw != b'0' {
                return false;
            }
            saw = b'_';
            continue;
        }
        if saw == b'_' {
            return false;
        }
        saw = b'!';
    }
    saw != b'_'
}

/// Parse an unsigned integer. On a range error the saturated value is
/// returned alongside the error kind.
fn parse_uint_raw(s: &[u8], base: i32, bit_size: i32) -> std::result::Result<u64, (NumErr, u64)> {
    if s.is_empty() {
        return Err((NumErr::Syntax, 0));
    }
    let base0 = base == 0;
    let mut digits = s;
    let base: u64 = match base {
        2..=36 => base as u64,
        0 => {
            if s[0] == b'0' {
                if s.len() >= 3 && s[1].to_ascii_lowercase() == b'b' {
                    digits = &s[2..];
                    2
                } else if s.len() >= 3 && s[1].to_ascii_lowercase() == b'o' {
                    digits = &s[2..];
                    8
                } else if s.len() >= 3 && s[1].to_ascii_lowercase() == b'x' {
                    digits = &s[2..];
                    16
                } else {
                    digits = &s[1..];
                    8
                }
            } else {
                10
            }
        }
        other => return Err((NumErr::Base(other), 0)),
    };
    let bit_size = match bit_size {
        0 => INT_SIZE as i32,
        1..=64 => bit_size,
        other => return Err((NumErr::BitSize(other), 0)),
    };
    let max_val: u64 = if bit_size == 64 {
        u64::MAX
    } else {
        (1u64 << bit_size) - 1
    };
    let mut underscores = false;
    let mut n: u64 = 0;
    for &c in digits {
        let d = match c {
            b'_' if base0 => {
                underscores = true;
                continue;
            }
            b'0'..=b'9' => c - b'0',
            _ if c.is_ascii_alphabetic() => c.to_ascii_lowercase() - b'a' + 10,
            _ => return Err((NumErr::Syntax, 0)),
        };
        if u64::from(d) >= base {
            return Err((NumErr::Syntax, 0));
        }
        n = match n.checked_mul(base).and_then(|v| v.checked_add(u64::from(d))) {
            Some(v) if v <= max_val => v,
            _ => return Err((NumErr::Range, max_val)),
        };
    }
    if underscores && !underscore_ok(s) {
        return Err((NumErr::Syntax, 0));
    }
    Ok(n)
}

/// Parse an unsigned integer in `base` (0 selects by prefix) fitting in
/// `bit_size` bits (0 means native int size).
pub fn parse_uint(s: &[u8], base: i32, bit_size: i32) -> Result<u64> {
    parse_uint_raw(s, base, bit_size).map_err(|(kind, _)| num_error("ParseUint", s, kind))
}

fn parse_int_named(func: &str, s: &[u8], base: i32, bit_size: i32) -> Result<i64> {
    if s.is_empty() {
        return Err(num_error(func, s, NumErr::Syntax));
    }
    let (neg, body) = match s[0] {
        b'+' => (false, &s[1..]),
        b'-' => (true, &s[1..]),
        _ => (false, s),
    };
    let un = match parse_uint_raw(body, base, bit_size) {
        Ok(v) => v,
        Err((NumErr::Range, v)) => v,
        Err((kind, _)) => return Err(num_error(func, s, kind)),
    };
    let bits = if bit_size == 0 { INT_SIZE as i32 } else { bit_size };
    let cutoff = 1u64 << (bits - 1);
    if !neg && un >= cutoff {
        return Err(num_error(func, s, NumErr::Range));
    }
    if neg && un > cutoff {
        return Err(num_error(func, s, NumErr::Range));
    }
    Ok(if neg { (un as i64).wrapping_neg() } else { un as i64 })
}

/// Parse a signed integer.
pub fn parse_int(s: &[u8], base: i32, bit_size: i32) -> Result<i64> {
    parse_int_named("ParseInt", s, base, bit_size)
}

/// Parse a decimal native-size integer.
pub fn atoi(s: &[u8]) -> Result<i64> {
    parse_int_named("Atoi", s, 10, 0)
}

/// Parse `1 t T TRUE true True 0 f F FALSE false False`.
pub fn parse_bool(s: &[u8]) -> Result<bool> {
    match s {
        b"1" | b"t" | b"T" | b"TRUE" | b"true" | b"True" => Ok(true),
        b"0" | b"f" | b"F" | b"FALSE" | b"false" | b"False" => Ok(false),
        _ => Err(num_error("ParseBool", s, NumErr::Syntax)),
    }
}

/// `"true"` or `"false"`.
pub fn format_bool(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

// Floats.

struct FloatInfo {
    mantbits: u32,
    expbits: u32,
    bias: i32,
}

const F32_INFO: FloatInfo = FloatInfo {
    mantbits: 23,
    expbits: 8,
    bias: -127,
};

const F64_INFO: FloatInfo = FloatInfo {
    mantbits: 52,
    expbits: 11,
    bias: -1023,
};

/// Decimal digits `0.d1d2... * 10^dp`, trailing zeros trimmed.
struct Digits {
    d: Vec<u8>,
    dp: i32,
}

impl Digits {
    /// Parse Rust's `{:e}` output for a non-negative finite value.
    fn from_exp_form(s: &str) -> Self {
        let (mant, exp) = s.split_once('e').unwrap_or((s, "0"));
        let exp: i32 = exp.parse().unwrap_or(0);
        let mut d: Vec<u8> = mant.bytes().filter(u8::is_ascii_digit).collect();
        while d.last() == Some(&b'0') {
            d.pop();
        }
        if d.is_empty() {
            return Self { d, dp: 0 };
        }
        Self { d, dp: exp + 1 }
    }

    fn shortest(a: f64, bit_size: u32) -> Self {
        if bit_size == 32 {
            Self::from_exp_form(&format!("{:e}", a as f32))
        } else {
            Self::from_exp_form(&format!("{:e}", a))
        }
    }

    fn rounded(a: f64, significant: usize) -> Self {
        Self::from_exp_form(&format!("{:.*e}", significant.saturating_sub(1), a))
    }

    fn nd(&self) -> i32 {
        self.d.len() as i32
    }
}

fn fmt_e(out: &mut String, digs: &Digits, prec: i32, fmt: u8) {
    out.push(digs.d.first().map_or('0', |&c| c as char));
    if prec > 0 {
        out.push('.');
        let mut i = 1usize;
        let m = digs.d.len().min(prec as usize + 1);
        if i < m {
            out.extend(digs.d[i..m].iter().map(|&c| c as char));
            i = m;
        }
        while i <= prec as usize {
            out.push('0');
            i += 1;
        }
    }
    out.push(fmt as char);
    let mut exp = if digs.d.is_empty() { 0 } else { digs.dp - 1 };
    if exp < 0 {
        out.push('-');
        exp = -exp;
    } else {
        out.push('+');
    }
    if exp < 10 {
        out.push('0');
    }
    out.push_str(&exp.to_string());
}

fn fmt_f(out: &mut String, digs: &Digits, prec: i32) {
    if digs.dp > 0 {
        let m = digs.d.len().min(digs.dp as usize);
        out.extend(digs.d[..m].iter().map(|&c| c as char));
        for _ in m..digs.dp as usize {
            out.push('0');
        }
    } else {
        out.push('0');
    }
    if prec > 0 {
        out.push('.');
        for i in 1..=prec {
            let j = digs.dp + i - 1;
            let c = if j >= 0 && j < digs.nd() {
                digs.d[j as usize] as char
            } else {
                '0'
            };
            out.push(c);
        }
    }
}

fn float_parts(v: f64, info: &FloatInfo, bit_size: u32) -> (u64, i32) {
    let bits = if bit_size == 32 {
        u64::from((v as f32).to_bits())
    } else {
        v.to_bits()
    };
    let mut exp = ((bits >> info.mantbits) & ((1u64 << info.expbits) - 1)) as i32;
    let mut mant = bits & ((1u64 << info.mantbits) - 1);
    if exp == 0 {
        exp += 1;
    } else {
        mant |= 1u64 << info.mantbits;
    }
    (mant, exp + info.bias)
}

fn fmt_b(out: &mut String, mant: u64, exp: i32, info: &FloatInfo) {
    out.push_str(&mant.to_string());
    out.push('p');
    out.push_str(&format!("{:+}", exp - info.mantbits as i32));
}

fn fmt_x(out: &mut String, prec: i32, fmt: u8, mut mant: u64, mut exp: i32, info: &FloatInfo) {
    if mant == 0 {
        exp = 0;
    }
    mant <<= 60 - info.mantbits;
    while mant != 0 && mant & (1 << 60) == 0 {
        mant <<= 1;
        exp -= 1;
    }
    if (0..15).contains(&prec) {
        let shift = (prec * 4) as u32;
        let extra = (mant << shift) & ((1 << 60) - 1);
        mant >>= 60 - shift;
        if extra | (mant & 1) > 1 << 59 {
            mant += 1;
        }
        mant <<= 60 - shift;
        if mant & (1 << 61) != 0 {
            mant >>= 1;
            exp += 1;
        }
    }
    let hex = if fmt == b'X' { UPPER_HEX } else { LOWER_HEX };
    out.push('0');
    out.push(fmt as char);
    out.push((b'0' + ((mant >> 60) & 1) as u8) as char);
    mant <<= 4;
    if prec < 0 && mant != 0 {
        out.push('.');
        while mant != 0 {
            out.push(hex[((mant >> 60) & 15) as usize] as char);
            mant <<= 4;
        }
    } else if prec > 0 {
        out.push('.');
        for _ in 0..prec {
            out.push(hex[((mant >> 60) & 15) as usize] as char);
            mant <<= 4;
        }
    }
    out.push(if fmt == b'X' { 'P' } else { 'p' });
    if exp < 0 {
        out.push('-');
        exp = -exp;
    } else {
        out.push('+');
    }
    if exp < 10 {
        out.push('0');
    }
    out.push_str(&exp.to_string());
}

/// Format a float. `fmt` is one of `b e E f g G x X`; `prec` -1 selects
/// the shortest output that round-trips at `bit_size` (32 or 64). An
/// unknown `fmt` yields `%` followed by the format byte.
pub fn format_float(f: f64, fmt: u8, prec: i32, bit_size: u32) -> String {
    let v = if bit_size == 32 { f64::from(f as f32) } else { f };
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    let info = if bit_size == 32 { &F32_INFO } else { &F64_INFO };
    let mut out = String::new();
    if v.is_sign_negative() {
        out.push('-');
    }
    let a = v.abs();
    let shortest = prec < 0;
    match fmt {
        b'b' => {
            let (mant, exp) = float_parts(a, info, bit_size);
            fmt_b(&mut out, mant, exp, info);
        }
        b'x' | b'X' => {
            let (mant, exp) = float_parts(a, info, bit_size);
            fmt_x(&mut out, prec, fmt, mant, exp, info);
        }
        b'e' | b'E' => {
            let digs = if shortest {
                Digits::shortest(a, bit_size)
            } else {
                Digits::rounded(a, prec as usize + 1)
            };
            let p = if shortest { (digs.nd() - 1).max(0) } else { prec };
            fmt_e(&mut out, &digs, p, fmt);
        }
        b'f' => {
            if shortest {
                let digs = Digits::shortest(a, bit_size);
                let p = (digs.nd() - digs.dp).max(0);
                fmt_f(&mut out, &digs, p);
            } else {
                out.push_str(&format!("{:.*}", prec as usize, a));
            }
        }
        b'g' | b'G' => {
            let digs = if shortest {
                Digits::shortest(a, bit_size)
            } else {
                Digits::rounded(a, prec.max(1) as usize)
            };
            let nd = digs.nd();
            let mut prec = if shortest { nd } else { prec.max(1) };
            let mut eprec = prec;
            if eprec > nd && nd >= digs.dp {
                eprec = nd;
            }
            if shortest {
                eprec = 6;
            }
            let exp = digs.dp - 1;
            if exp < -4 || exp >= eprec {
                if prec > nd {
                    prec = nd;
                }
                fmt_e(&mut out, &digs, prec - 1, fmt + b'e' - b'g');
            } else {
                if prec > digs.dp {
                    prec = nd;
                }
                fmt_f(&mut out, &digs, (prec - digs.dp).max(0));
            }
        }
        other => return format!("%{}", other as char),
    }
    out
}

/// Format a complex number as `(re±imi)`; `bit_size` is 64 or 128.
pub fn format_complex(re: f64, im: f64, fmt: u8, prec: i32, bit_size: u32) -> String {
    let part = bit_size / 2;
    let re = format_float(re, fmt, prec, part);
    let mut im = format_float(im, fmt, prec, part);
    if !im.starts_with('+') && !im.starts_with('-') {
        im.insert(0, '+');
    }
    format!("({}{}i)", re, im)
}

fn parse_float_named(func: &str, s: &[u8], bit_size: i32) -> Result<f64> {
    let text = std::str::from_utf8(s).map_err(|_| num_error(func, s, NumErr::Syntax))?;
    let body = text.trim_start_matches(['+', '-']);
    if text.len() - body.len() > 1 || body.starts_with(['+', '-']) {
        return Err(num_error(func, s, NumErr::Syntax));
    }
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        let magnitude = parse_hex_float(hex, bit_size).map_err(|kind| num_error(func, s, kind))?;
        return Ok(if text.starts_with('-') { -magnitude } else { magnitude });
    }
    let literal_inf = body.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("inf"));
    let value = if bit_size == 32 {
        text.parse::<f32>().map(f64::from)
    } else {
        text.parse::<f64>()
    }
    .map_err(|_| num_error(func, s, NumErr::Syntax))?;
    if value.is_infinite() && !literal_inf {
        return Err(num_error(func, s, NumErr::Range));
    }
    Ok(value)
}

/// `2^e` for a normal exponent.
fn pow2(e: i64) -> f64 {
    f64::from_bits(((e + 1023) as u64) << 52)
}

fn scale_pow2(mut x: f64, mut k: i64) -> f64 {
    while k > 1000 {
        x *= pow2(1000);
        k -= 1000;
    }
    while k < -1000 {
        x *= pow2(-1000);
        k += 1000;
    }
    x * pow2(k)
}

/// Parse the digits of a hexadecimal float after its `0x` prefix, such as
/// `1.8p3`. The `p` exponent is required. Rounds to nearest even at
/// `bit_size` precision, including subnormals.
fn parse_hex_float(text: &str, bit_size: i32) -> std::result::Result<f64, NumErr> {
    let (mantissa, exponent) = text.split_once(['p', 'P']).ok_or(NumErr::Syntax)?;

    let mut mant: u64 = 0;
    let mut exp: i64 = 0;
    let mut sticky = false;
    let mut seen_digit = false;
    let mut seen_dot = false;
    // '_' may follow the base prefix or a digit and must precede a digit.
    let mut after_digit = true;
    let chars = mantissa.as_bytes();
    for (i, &c) in chars.iter().enumerate() {
        match c {
            b'.' if !seen_dot => {
                seen_dot = true;
                after_digit = false;
            }
            b'_' => {
                let next_is_digit = chars.get(i + 1).is_some_and(u8::is_ascii_hexdigit);
                if !after_digit || !next_is_digit {
                    return Err(NumErr::Syntax);
                }
            }
            _ => {
                let d = unhex(c).ok_or(NumErr::Syntax)?;
                seen_digit = true;
                after_digit = true;
                if mant >> 60 == 0 {
                    mant = (mant << 4) | u64::from(d);
                    if seen_dot {
                        exp -= 4;
                    }
                } else {
                    sticky |= d != 0;
                    if !seen_dot {
                        exp += 4;
                    }
                }
            }
        }
    }
    if !seen_digit {
        return Err(NumErr::Syntax);
    }

    let (negative, digits) = match exponent.as_bytes() {
        [b'-', rest @ ..] => (true, rest),
        [b'+', rest @ ..] => (false, rest),
        rest => (false, rest),
    };
    let mut e: i64 = 0;
    let mut seen_exp_digit = false;
    for (i, &c) in digits.iter().enumerate() {
        match c {
            b'0'..=b'9' => {
                seen_exp_digit = true;
                e = (e * 10 + i64::from(c - b'0')).min(1 << 20);
            }
            b'_' if i > 0
                && digits[i - 1].is_ascii_digit()
                && digits.get(i + 1).is_some_and(u8::is_ascii_digit) => {}
            _ => return Err(NumErr::Syntax),
        }
    }
    if !seen_exp_digit {
        return Err(NumErr::Syntax);
    }
    exp += if negative { -e } else { e };

    if mant == 0 {
        return Ok(0.0);
    }
    let lz = mant.leading_zeros();
    mant <<= lz;
    exp -= i64::from(lz);

    let (prec, emin, emax): (i64, i64, i64) = if bit_size == 32 {
        (24, -126, 127)
    } else {
        (53, -1022, 1023)
    };
    let top = exp + 63;
    let keep = if top < emin { prec - (emin - top) } else { prec };
    if keep < 0 {
        return Ok(0.0);
    }
    let shift = 64 - keep;
    let (mut q, rem) = if shift == 64 {
        (0, mant)
    } else {
        (mant >> shift, mant & ((1 << shift) - 1))
    };
    let half = 1u64 << (shift - 1);
    if rem > half || (rem == half && (sticky || q & 1 == 1)) {
        q += 1;
    }
    if q == 0 {
        return Ok(0.0);
    }
    let scale = exp + shift;
    if 63 - i64::from(q.leading_zeros()) + scale > emax {
        return Err(NumErr::Range);
    }
    Ok(scale_pow2(q as f64, scale))
}

/// Parse a decimal or `0x` hexadecimal float (`inf`, `infinity` and `nan`
/// accepted) at `bit_size` 32 or 64. Overflow is a range error.
pub fn parse_float(s: &[u8], bit_size: i32) -> Result<f64> {
    parse_float_named("ParseFloat", s, bit_size)
}

/// Parse `N`, `Ni` or `N±Ni`, optionally in parentheses.
pub fn parse_complex(s: &[u8], bit_size: i32) -> Result<(f64, f64)> {
    const FUNC: &str = "ParseComplex";
    let part_size = if bit_size == 64 { 32 } else { 64 };
    let mut body = s;
    if body.len() >= 2 && body[0] == b'(' && body[body.len() - 1] == b')' {
        body = &body[1..body.len() - 1];
    }
    let convert = |part: &[u8]| -> Result<f64> {
        parse_float_named(FUNC, part, part_size).map_err(|e| match e.status() {
            Status::Range => num_error(FUNC, s, NumErr::Range),
            _ => num_error(FUNC, s, NumErr::Syntax),
        })
    };
    let Some(imag) = body.strip_suffix(b"i") else {
        return Ok((convert(body)?, 0.0));
    };
    let split = (1..imag.len())
        .rev()
        .find(|&i| {
            matches!(imag[i], b'+' | b'-') && !matches!(imag[i - 1], b'e' | b'E' | b'p' | b'P')
        });
    let (re, im) = match split {
        Some(i) => (&imag[..i], &imag[i..]),
        None => (&b"0"[..], imag),
    };
    let im_val = match im {
        b"+" | b"" => 1.0,
        b"-" => -1.0,
        _ => convert(im)?,
    };
    Ok((convert(re)?, im_val))
}

// Quoting.

fn is_in_graphic_list(u: u32) -> bool {
    matches!(u, 0xA0 | 0x1680 | 0x2000..=0x200A | 0x202F | 0x205F | 0x3000)
}

/// Whether `r` is printable: a letter, mark, number, punctuation, symbol or
/// the ASCII space. Format characters, private-use planes and
/// non-characters are not printable.
pub fn is_print(r: u32) -> bool {
    let Some(c) = char::from_u32(r) else {
        return false;
    };
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    !matches!(
        r,
        0xAD | 0x600..=0x605
            | 0x61C
            | 0x6DD
            | 0x70F
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xFFFE
            | 0xFFFF
            | 0xE000..=0xF8FF
            | 0xE0001
            | 0xE0020..=0xE007F
            | 0xF0000..=0x10FFFF
    )
}

/// Whether `r` is printable or a Unicode space separator.
pub fn is_graphic(r: u32) -> bool {
    is_print(r) || is_in_graphic_list(r)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteMode {
    Plain,
    Ascii,
    Graphic,
}

fn push_hex(out: &mut Vec<u8>, prefix: &[u8], v: u32, width: u32) {
    out.extend_from_slice(prefix);
    for shift in (0..width).rev() {
        out.push(LOWER_HEX[((v >> (shift * 4)) & 0xF) as usize]);
    }
}

fn append_escaped_rune(out: &mut Vec<u8>, r: char, quote: u8, mode: QuoteMode) {
    let u = r as u32;
    if u == u32::from(quote) || r == '\\' {
        out.push(b'\\');
        out.push(u as u8);
        return;
    }
    let keep = match mode {
        QuoteMode::Ascii => u < 0x80 && is_print(u),
        QuoteMode::Plain => is_print(u),
        QuoteMode::Graphic => is_print(u) || is_in_graphic_list(u),
    };
    if keep {
        let mut tmp = [0u8; 4];
        out.extend_from_slice(r.encode_utf8(&mut tmp).as_bytes());
        return;
    }
    match r {
        '\x07' => out.extend_from_slice(b"\\a"),
        '\x08' => out.extend_from_slice(b"\\b"),
        '\x0c' => out.extend_from_slice(b"\\f"),
        '\n' => out.extend_from_slice(b"\\n"),
        '\r' => out.extend_from_slice(b"\\r"),
        '\t' => out.extend_from_slice(b"\\t"),
        '\x0b' => out.extend_from_slice(b"\\v"),
        _ if u < 0x20 || u == 0x7f => push_hex(out, b"\\x", u, 2),
        _ if u < 0x10000 => push_hex(out, b"\\u", u, 4),
        _ => push_hex(out, b"\\U", u, 8),
    }
}

fn append_quoted(out: &mut Vec<u8>, s: &[u8], quote: u8, mode: QuoteMode) {
    out.push(quote);
    for (at, c, _) in bytes::runes(s) {
        match c {
            Some(r) => append_escaped_rune(out, r, quote, mode),
            None => push_hex(out, b"\\x", u32::from(s[at]), 2),
        }
    }
    out.push(quote);
}

fn append_quoted_rune(out: &mut Vec<u8>, r: u32, mode: QuoteMode) {
    let c = char::from_u32(r).unwrap_or(char::REPLACEMENT_CHARACTER);
    out.push(b'\'');
    append_escaped_rune(out, c, b'\'', mode);
    out.push(b'\'');
}

/// Double-quoted literal with escapes for non-printable runes.
pub fn quote(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 2);
    append_quoted(&mut out, s, b'"', QuoteMode::Plain);
    out
}

/// Double-quoted literal using only ASCII.
pub fn quote_to_ascii(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 2);
    append_quoted(&mut out, s, b'"', QuoteMode::Ascii);
    out
}

/// Double-quoted literal keeping graphic runes.
pub fn quote_to_graphic(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + 2);
    append_quoted(&mut out, s, b'"', QuoteMode::Graphic);
    out
}

/// Whether `s` can be a back-quoted literal without change.
pub fn can_backquote(s: &[u8]) -> bool {
    bytes::runes(s).all(|(_, c, w)| match c {
        None => false,
        Some('\u{FEFF}') => false,
        Some(_) if w > 1 => true,
        Some(r) => !((r < ' ' && r != '\t') || r == '`' || r == '\u{7f}'),
    })
}

fn unhex(c: u8) -> Option<u32> {
    (c as char).to_digit(16)
}

/// Decode the first character or escape of a quoted body.
///
/// Returns `(value, multibyte, tail)`.
pub fn unquote_char(s: &[u8], quote: u8) -> Result<(u32, bool, &[u8])> {
    let Some(&c) = s.first() else {
        return Err(plain_syntax());
    };
    if c == quote && (quote == b'\'' || quote == b'"') {
        return Err(plain_syntax());
    }
    if c >= 0x80 {
        return Ok(match bytes::decode_rune(s) {
            Some((r, n)) => (r as u32, true, &s[n..]),
            None => (char::REPLACEMENT_CHARACTER as u32, true, &s[1..]),
        });
    }
    if c != b'\\' {
        return Ok((u32::from(c), false, &s[1..]));
    }
    if s.len() <= 1 {
        return Err(plain_syntax());
    }
    let esc = s[1];
    let mut rest = &s[2..];
    let simple = |v: u8| Ok((u32::from(v), false, &s[2..]));
    match esc {
        b'a' => simple(0x07),
        b'b' => simple(0x08),
        b'f' => simple(0x0c),
        b'n' => simple(b'\n'),
        b'r' => simple(b'\r'),
        b't' => simple(b'\t'),
        b'v' => simple(0x0b),
        b'\\' => simple(b'\\'),
        b'\'' | b'"' => {
            if esc != quote {
                return Err(plain_syntax());
            }
            simple(esc)
        }
        b'x' | b'u' | b'U' => {
            let n = match esc {
                b'x' => 2,
                b'u' => 4,
                _ => 8,
            };
            if rest.len() < n {
                return Err(plain_syntax());
            }
            let mut v: u32 = 0;
            for &h in &rest[..n] {
                v = (v << 4) | unhex(h).ok_or_else(plain_syntax)?;
            }
            rest = &rest[n..];
            if esc == b'x' {
                return Ok((v, false, rest));
            }
            if char::from_u32(v).is_none() {
                return Err(plain_syntax());
            }
            Ok((v, true, rest))
        }
        b'0'..=b'7' => {
            let mut v = u32::from(esc - b'0');
            if rest.len() < 2 {
                return Err(plain_syntax());
            }
            for &o in &rest[..2] {
                if !(b'0'..=b'7').contains(&o) {
                    return Err(plain_syntax());
                }
                v = (v << 3) | u32::from(o - b'0');
            }
            rest = &rest[2..];
            if v > 255 {
                return Err(plain_syntax());
            }
            Ok((v, false, rest))
        }
        _ => Err(plain_syntax()),
    }
}

/// Scan a quoted literal at the start of `input`.
///
/// Returns the unescaped value (when requested) and the byte length of the
/// literal including its quotes.
fn unquote_prefix(input: &[u8], unescape: bool) -> Result<(Vec<u8>, usize)> {
    if input.len() < 2 {
        return Err(plain_syntax());
    }
    let quote = input[0];
    let end = bytes::index_byte(&input[1..], quote).ok_or_else(plain_syntax)? + 2;
    match quote {
        b'`' => {
            let body = &input[1..end - 1];
            let out = if unescape {
                body.iter().copied().filter(|&b| b != b'\r').collect()
            } else {
                input[..end].to_vec()
            };
            Ok((out, end))
        }
        b'"' | b'\'' => {
            let lit = &input[..end];
            if !lit.contains(&b'\\') && !lit.contains(&b'\n') {
                let body = &lit[1..end - 1];
                let valid = if quote == b'"' {
                    std::str::from_utf8(body).is_ok()
                } else {
                    match bytes::decode_rune(body) {
                        Some((_, n)) => n + 2 == end,
                        None => false,
                    }
                };
                if valid {
                    let out = if unescape { body.to_vec() } else { lit.to_vec() };
                    return Ok((out, end));
                }
            }
            let mut buf = Vec::new();
            let mut rest = &input[1..];
            while let Some(&c) = rest.first() {
                if c == quote {
                    break;
                }
                if c == b'\n' {
                    return Err(plain_syntax());
                }
                let (r, multibyte, tail) = unquote_char(rest, quote)?;
                rest = tail;
                if unescape {
                    match char::from_u32(r) {
                        Some(ch) if multibyte && r >= 0x80 => {
                            let mut tmp = [0u8; 4];
                            buf.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
                        }
                        _ => buf.push(r as u8),
                    }
                }
                if quote == b'\'' {
                    break;
                }
            }
            if rest.first() != Some(&quote) {
                return Err(plain_syntax());
            }
            let consumed = input.len() - rest.len() + 1;
            if !unescape {
                buf = input[..consumed].to_vec();
            }
            Ok((buf, consumed))
        }
        _ => Err(plain_syntax()),
    }
}

/// Interpret a single-, double- or back-quoted literal.
pub fn unquote(s: &[u8]) -> Result<Vec<u8>> {
    let (out, n) = unquote_prefix(s, true)?;
    if n != s.len() {
        return Err(plain_syntax());
    }
    Ok(out)
}

/// The quoted literal at the start of `s`, quotes included.
pub fn quoted_prefix(s: &[u8]) -> Result<Vec<u8>> {
    unquote_prefix(s, false).map(|(out, _)| out)
}

// Exports.

fn base_arg(op: &str, base: c_int) -> u32 {
    if !(2..=36).contains(&base) {
        contract::violation(op, format_args!("illegal base {}", base));
    }
    base as u32
}

fn float_bits_arg(op: &str, bit_size: c_int) -> u32 {
    match bit_size {
        32 | 64 => bit_size as u32,
        other => contract::violation(op, format_args!("illegal bitSize {}", other)),
    }
}

fn fmt_arg(op: &str, fmt: u8) -> u8 {
    if !matches!(fmt, b'b' | b'e' | b'E' | b'f' | b'g' | b'G' | b'x' | b'X') {
        contract::violation(op, format_args!("illegal format {:?}", fmt as char));
    }
    fmt
}

fn complex_bits_arg(op: &str, bit_size: c_int) -> u32 {
    match bit_size {
        64 | 128 => bit_size as u32,
        other => contract::violation(op, format_args!("illegal bitSize {}", other)),
    }
}

fn append_to(dst: FatBytes, op: &str, tail: &[u8]) -> FatBytes {
    let mut out = dst.resolve(op).as_slice().to_vec();
    out.extend_from_slice(tail);
    FatBytes::register(Bytes::new(out))
}

/// Bit width of the platform `int`.
#[no_mangle]
pub extern "C" fn fat_ConvIntSize() -> c_int {
    INT_SIZE as c_int
}

/// `"true"` or `"false"`.
#[no_mangle]
pub extern "C" fn fat_ConvFormatBool(b: bool) -> FatString {
    new_string(format_bool(b))
}

/// Formats `i` in `base`. A base outside 2..=36 is fatal.
#[no_mangle]
pub extern "C" fn fat_ConvFormatInt(i: i64, base: c_int) -> FatString {
    new_string(format_int(i, base_arg("fat_ConvFormatInt", base)))
}

/// Formats `i` in `base` (2..=36).
#[no_mangle]
pub extern "C" fn fat_ConvFormatUint(i: u64, base: c_int) -> FatString {
    new_string(format_uint(i, base_arg("fat_ConvFormatUint", base)))
}

/// Formats a float; `bit_size` other than 32 or 64 is fatal.
#[no_mangle]
pub extern "C" fn fat_ConvFormatFloat(f: f64, fmt: u8, prec: c_int, bit_size: c_int) -> FatString {
    const OP: &str = "fat_ConvFormatFloat";
    new_string(format_float(f, fmt_arg(OP, fmt), prec, float_bits_arg(OP, bit_size)))
}

/// Formats `(re+imi)` with each part formatted like `fat_ConvFormatFloat`.
#[no_mangle]
pub extern "C" fn fat_ConvFormatComplex(
    re: f64,
    im: f64,
    fmt: u8,
    prec: c_int,
    bit_size: c_int,
) -> FatString {
    const OP: &str = "fat_ConvFormatComplex";
    let bits = complex_bits_arg(OP, bit_size);
    new_string(format_complex(re, im, fmt_arg(OP, fmt), prec, bits))
}

/// Decimal form of `i`.
#[no_mangle]
pub extern "C" fn fat_ConvItoa(i: c_int) -> FatString {
    new_string(format_int(i64::from(i), 10))
}

/// Double-quoted literal with Go escapes.
#[no_mangle]
pub extern "C" fn fat_ConvQuote(s: FatString) -> FatString {
    new_string(quote(s.resolve("fat_ConvQuote").as_bytes()))
}

/// Like `fat_ConvQuote`, escaping everything outside printable ASCII.
#[no_mangle]
pub extern "C" fn fat_ConvQuoteToASCII(s: FatString) -> FatString {
    new_string(quote_to_ascii(s.resolve("fat_ConvQuoteToASCII").as_bytes()))
}

/// Like `fat_ConvQuote`, keeping graphic characters unescaped.
#[no_mangle]
pub extern "C" fn fat_ConvQuoteToGraphic(s: FatString) -> FatString {
    new_string(quote_to_graphic(s.resolve("fat_ConvQuoteToGraphic").as_bytes()))
}

/// Single-quoted character literal.
#[no_mangle]
pub extern "C" fn fat_ConvQuoteRune(r: u32) -> FatString {
    let mut out = Vec::new();
    append_quoted_rune(&mut out, r, QuoteMode::Plain);
    new_string(out)
}

/// Single-quoted literal, escaping everything outside printable ASCII.
#[no_mangle]
pub extern "C" fn fat_ConvQuoteRuneToASCII(r: u32) -> FatString {
    let mut out = Vec::new();
    append_quoted_rune(&mut out, r, QuoteMode::Ascii);
    new_string(out)
}

/// Single-quoted literal, keeping graphic characters unescaped.
#[no_mangle]
pub extern "C" fn fat_ConvQuoteRuneToGraphic(r: u32) -> FatString {
    let mut out = Vec::new();
    append_quoted_rune(&mut out, r, QuoteMode::Graphic);
    new_string(out)
}

/// Reports whether `s` fits in a raw backquoted literal.
#[no_mangle]
pub extern "C" fn fat_ConvCanBackquote(s: FatString) -> bool {
    can_backquote(s.resolve("fat_ConvCanBackquote").as_bytes())
}

/// Reports whether `r` is printable (letters, marks, numbers, punctuation, symbols and U+0020).
#[no_mangle]
pub extern "C" fn fat_ConvIsPrint(r: u32) -> bool {
    is_print(r)
}

/// Like `fat_ConvIsPrint`, also accepting other Unicode space characters.
#[no_mangle]
pub extern "C" fn fat_ConvIsGraphic(r: u32) -> bool {
    is_graphic(r)
}

/// Appends the formatted value to `dst` and returns a new byte value.
#[no_mangle]
pub extern "C" fn fat_ConvAppendBool(dst: FatBytes, b: bool) -> FatBytes {
    append_to(dst, "fat_ConvAppendBool", format_bool(b).as_bytes())
}

/// Appends the formatted value to `dst` and returns a new byte value.
#[no_mangle]
pub extern "C" fn fat_ConvAppendInt(dst: FatBytes, i: i64, base: c_int) -> FatBytes {
    const OP: &str = "fat_ConvAppendInt";
    append_to(dst, OP, format_int(i, base_arg(OP, base)).as_bytes())
}

/// Appends the formatted value to `dst` and returns a new byte value.
#[no_mangle]
pub extern "C" fn fat_ConvAppendUint(dst: FatBytes, i: u64, base: c_int) -> FatBytes {
    const OP: &str = "fat_ConvAppendUint";
    append_to(dst, OP, format_uint(i, base_arg(OP, base)).as_bytes())
}

/// Appends the formatted value to `dst` and returns a new byte value.
#[no_mangle]
pub extern "C" fn fat_ConvAppendFloat(
    dst: FatBytes,
    f: f64,
    fmt: u8,
    prec: c_int,
    bit_size: c_int,
) -> FatBytes {
    const OP: &str = "fat_ConvAppendFloat";
    let text = format_float(f, fmt_arg(OP, fmt), prec, float_bits_arg(OP, bit_size));
    append_to(dst, OP, text.as_bytes())
}

/// Appends the quoted string to `dst`.
#[no_mangle]
pub extern "C" fn fat_ConvAppendQuote(dst: FatBytes, s: FatString) -> FatBytes {
    const OP: &str = "fat_ConvAppendQuote";
    append_to(dst, OP, &quote(s.resolve(OP).as_bytes()))
}

/// Appends the quoted string to `dst`.
#[no_mangle]
pub extern "C" fn fat_ConvAppendQuoteToASCII(dst: FatBytes, s: FatString) -> FatBytes {
    const OP: &str = "fat_ConvAppendQuoteToASCII";
    append_to(dst, OP, &quote_to_ascii(s.resolve(OP).as_bytes()))
}

/// Appends the quoted string to `dst`.
#[no_mangle]
pub extern "C" fn fat_ConvAppendQuoteToGraphic(dst: FatBytes, s: FatString) -> FatBytes {
    const OP: &str = "fat_ConvAppendQuoteToGraphic";
    append_to(dst, OP, &quote_to_graphic(s.resolve(OP).as_bytes()))
}

/// Appends the quoted character to `dst`.
#[no_mangle]
pub extern "C" fn fat_ConvAppendQuoteRune(dst: FatBytes, r: u32) -> FatBytes {
    let mut out = Vec::new();
    append_quoted_rune(&mut out, r, QuoteMode::Plain);
    append_to(dst, "fat_ConvAppendQuoteRune", &out)
}

/// Appends the quoted character to `dst`.
#[no_mangle]
pub extern "C" fn fat_ConvAppendQuoteRuneToASCII(dst: FatBytes, r: u32) -> FatBytes {
    let mut out = Vec::new();
    append_quoted_rune(&mut out, r, QuoteMode::Ascii);
    append_to(dst, "fat_ConvAppendQuoteRuneToASCII", &out)
}

/// Appends the quoted character to `dst`.
#[no_mangle]
pub extern "C" fn fat_ConvAppendQuoteRuneToGraphic(dst: FatBytes, r: u32) -> FatBytes {
    let mut out = Vec::new();
    append_quoted_rune(&mut out, r, QuoteMode::Graphic);
    append_to(dst, "fat_ConvAppendQuoteRuneToGraphic", &out)
}

/// Parses a boolean into `*out_value` (0 or 1).
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvParseBool(
    s: FatString,
    out_value: *mut c_int,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvParseBool";
    let out_value = raw::out(OP, out_value, "out_value");
    let out_err = ffi::out_err(OP, out_err);
    *out_value = 0;
    let result = parse_bool(s.resolve(OP).as_bytes());
    ffi::complete(OP, out_err, result, |v| *out_value = c_int::from(v))
}

/// Parses a signed integer. Bad text is `SYNTAX`, overflow `RANGE`, an
/// invalid base or bit size `OTHER`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvParseInt(
    s: FatString,
    base: c_int,
    bit_size: c_int,
    out_value: *mut i64,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvParseInt";
    let out_value = raw::out(OP, out_value, "out_value");
    let out_err = ffi::out_err(OP, out_err);
    *out_value = 0;
    let result = parse_int(s.resolve(OP).as_bytes(), base, bit_size);
    ffi::complete(OP, out_err, result, |v| *out_value = v)
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvParseUint(
    s: FatString,
    base: c_int,
    bit_size: c_int,
    out_value: *mut u64,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvParseUint";
    let out_value = raw::out(OP, out_value, "out_value");
    let out_err = ffi::out_err(OP, out_err);
    *out_value = 0;
    let result = parse_uint(s.resolve(OP).as_bytes(), base, bit_size);
    ffi::complete(OP, out_err, result, |v| *out_value = v)
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvParseFloat(
    s: FatString,
    bit_size: c_int,
    out_value: *mut f64,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvParseFloat";
    let out_value = raw::out(OP, out_value, "out_value");
    let out_err = ffi::out_err(OP, out_err);
    *out_value = 0.0;
    let result = parse_float(s.resolve(OP).as_bytes(), bit_size);
    ffi::complete(OP, out_err, result, |v| *out_value = v)
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvParseComplex(
    s: FatString,
    bit_size: c_int,
    out_re: *mut f64,
    out_im: *mut f64,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvParseComplex";
    let out_re = raw::out(OP, out_re, "out_re");
    let out_im = raw::out(OP, out_im, "out_im");
    let out_err = ffi::out_err(OP, out_err);
    *out_re = 0.0;
    *out_im = 0.0;
    let result = parse_complex(s.resolve(OP).as_bytes(), bit_size);
    ffi::complete(OP, out_err, result, |(re, im)| {
        *out_re = re;
        *out_im = im;
    })
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvAtoi(
    s: FatString,
    out_value: *mut i64,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvAtoi";
    let out_value = raw::out(OP, out_value, "out_value");
    let out_err = ffi::out_err(OP, out_err);
    *out_value = 0;
    let result = atoi(s.resolve(OP).as_bytes());
    ffi::complete(OP, out_err, result, |v| *out_value = v)
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvUnquote(
    s: FatString,
    out_value: *mut FatString,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvUnquote";
    let out_value = raw::out(OP, out_value, "out_value");
    let out_err = ffi::out_err(OP, out_err);
    *out_value = FatString::invalid();
    let result = unquote(s.resolve(OP).as_bytes());
    ffi::complete(OP, out_err, result, |v| *out_value = new_string(v))
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvQuotedPrefix(
    s: FatString,
    out_value: *mut FatString,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvQuotedPrefix";
    let out_value = raw::out(OP, out_value, "out_value");
    let out_err = ffi::out_err(OP, out_err);
    *out_value = FatString::invalid();
    let result = quoted_prefix(s.resolve(OP).as_bytes());
    ffi::complete(OP, out_err, result, |v| *out_value = new_string(v))
}

/// Decodes the first character or escape of `s` inside a `quote` literal.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_ConvUnquoteChar(
    s: FatString,
    quote: u8,
    out_rune: *mut u32,
    out_multibyte: *mut bool,
    out_tail: *mut FatString,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_ConvUnquoteChar";
    let out_rune = raw::out(OP, out_rune, "out_rune");
    let out_multibyte = raw::out(OP, out_multibyte, "out_multibyte");
    let out_tail = raw::out(OP, out_tail, "out_tail");
    let out_err = ffi::out_err(OP, out_err);
    *out_rune = 0;
    *out_multibyte = false;
    *out_tail = FatString::invalid();
    let s = s.resolve(OP);
    let result = unquote_char(s.as_bytes(), quote);
    ffi::complete(OP, out_err, result, |(r, multibyte, tail)| {
        *out_rune = r;
        *out_multibyte = multibyte;
        *out_tail = new_string(tail);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> String {
        String::from_utf8(quote(s.as_bytes())).unwrap()
    }

    #[test]
    fn test_format_int_bases() {
        assert_eq!(format_int(-42, 10), "-42");
        assert_eq!(format_int(255, 16), "ff");
        assert_eq!(format_uint(35, 36), "z");
        assert_eq!(format_int(i64::MIN, 2).len(), 65);
        assert_eq!(format_uint(0, 7), "0");
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int(b"-123", 10, 64).unwrap(), -123);
        assert_eq!(parse_int(b"0x1f", 0, 64).unwrap(), 31);
        assert_eq!(parse_int(b"0b101", 0, 8).unwrap(), 5);
        assert_eq!(parse_int(b"0755", 0, 64).unwrap(), 0o755);
        assert_eq!(parse_int(b"1_000", 0, 64).unwrap(), 1000);
        assert!(parse_int(b"1_000", 10, 64).is_err());
        assert_eq!(parse_int(b"-128", 10, 8).unwrap(), -128);
        let err = parse_int(b"128", 10, 8).unwrap_err();
        assert_eq!(err.status(), Status::Range);
        assert_eq!(
            err.to_string(),
            "strconv.ParseInt: parsing \"128\": value out of range"
        );
        let err = parse_int(b"abc", 10, 64).unwrap_err();
        assert_eq!(err.to_string(), "strconv.ParseInt: parsing \"abc\": invalid syntax");
        assert_eq!(parse_int(b"1", 1, 64).unwrap_err().status(), Status::Other);
    }

    #[test]
    fn test_parse_uint_and_atoi() {
        assert_eq!(parse_uint(b"18446744073709551615", 10, 64).unwrap(), u64::MAX);
        assert_eq!(
            parse_uint(b"18446744073709551616", 10, 64).unwrap_err().status(),
            Status::Range
        );
        assert_eq!(atoi(b"42").unwrap(), 42);
        assert!(atoi(b"").unwrap_err().to_string().starts_with("strconv.Atoi"));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(b"True").unwrap());
        assert!(!parse_bool(b"0").unwrap());
        assert_eq!(parse_bool(b"yes").unwrap_err().status(), Status::Syntax);
    }

    #[test]
    fn test_format_float_modes() {
        assert_eq!(format_float(3.0, b'f', -1, 64), "3");
        assert_eq!(format_float(3.14159, b'f', 2, 64), "3.14");
        assert_eq!(format_float(1234.5678, b'e', 3, 64), "1.235e+03");
        assert_eq!(format_float(1234.5678, b'E', -1, 64), "1.2345678E+03");
        assert_eq!(format_float(1e21, b'g', -1, 64), "1e+21");
        assert_eq!(format_float(100000.0, b'g', -1, 64), "100000");
        assert_eq!(format_float(0.0001, b'g', -1, 64), "0.0001");
        assert_eq!(format_float(0.00001, b'g', -1, 64), "1e-05");
        assert_eq!(format_float(1.0, b'g', 5, 64), "1");
        assert_eq!(format_float(123456.0, b'g', 3, 64), "1.23e+05");
        assert_eq!(format_float(0.0, b'e', -1, 64), "0e+00");
        assert_eq!(format_float(-0.0, b'g', -1, 64), "-0");
        assert_eq!(format_float(0.1, b'g', -1, 32), "0.1");
        assert_eq!(format_float(f64::INFINITY, b'g', -1, 64), "+Inf");
        assert_eq!(format_float(f64::NAN, b'f', 2, 64), "NaN");
        assert_eq!(format_float(1.0, b'z', -1, 64), "%z");
    }

    #[test]
    fn test_format_float_binary_forms() {
        assert_eq!(format_float(1.0, b'b', -1, 64), "4503599627370496p-52");
        assert_eq!(format_float(1.0, b'x', -1, 64), "0x1p+00");
        assert_eq!(format_float(3.0, b'x', -1, 64), "0x1.8p+01");
        assert_eq!(format_float(1.0, b'X', 2, 64), "0X1.00P+00");
    }

    #[test]
    fn test_format_complex() {
        assert_eq!(format_complex(1.0, 2.0, b'g', -1, 128), "(1+2i)");
        assert_eq!(format_complex(1.5, -0.5, b'f', 1, 128), "(1.5-0.5i)");
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(b"3.25", 64).unwrap(), 3.25);
        assert_eq!(parse_float(b"-Inf", 64).unwrap(), f64::NEG_INFINITY);
        assert!(parse_float(b"nan", 64).unwrap().is_nan());
        assert_eq!(parse_float(b"1e400", 64).unwrap_err().status(), Status::Range);
        assert_eq!(parse_float(b"1e39", 32).unwrap_err().status(), Status::Range);
        assert_eq!(parse_float(b"1.5x", 64).unwrap_err().status(), Status::Syntax);
        assert_eq!(parse_float(b"--1", 64).unwrap_err().status(), Status::Syntax);
    }

    #[test]
    fn test_parse_hex_float() {
        assert_eq!(parse_float(b"0x1p-2", 64).unwrap(), 0.25);
        assert_eq!(parse_float(b"-0x1.8p1", 64).unwrap(), -3.0);
        assert_eq!(parse_float(b"0X_1Fp0", 64).unwrap(), 31.0);
        assert_eq!(parse_float(b"0x1p1_0", 64).unwrap(), 1024.0);
        assert_eq!(parse_float(b"0x1.00000000000008p0", 64).unwrap(), 1.0);
        assert_eq!(parse_float(b"0x1.000000000000081p0", 64).unwrap(), 1.0 + f64::EPSILON);
        assert_eq!(parse_float(b"0x1p-1074", 64).unwrap(), f64::from_bits(1));
        assert_eq!(parse_float(b"0x1p-1075", 64).unwrap(), 0.0);
        assert_eq!(parse_float(b"0x1p-149", 32).unwrap(), f64::from(f32::from_bits(1)));
        assert_eq!(parse_float(b"0x1p1024", 64).unwrap_err().status(), Status::Range);
        assert_eq!(parse_float(b"0x1p128", 32).unwrap_err().status(), Status::Range);
        for bad in [&b"0x1"[..], b"0xp1", b"0x1.8p", b"0x1__0p0", b"0x1g"] {
            assert_eq!(parse_float(bad, 64).unwrap_err().status(), Status::Syntax, "{:?}", bad);
        }
        assert_eq!(parse_complex(b"0x1p1+0x1p-1i", 128).unwrap(), (2.0, 0.5));
    }

    #[test]
    fn test_parse_complex() {
        assert_eq!(parse_complex(b"(1+2i)", 128).unwrap(), (1.0, 2.0));
        assert_eq!(parse_complex(b"3", 128).unwrap(), (3.0, 0.0));
        assert_eq!(parse_complex(b"-2.5i", 128).unwrap(), (0.0, -2.5));
        assert_eq!(parse_complex(b"1e3-1e-2i", 128).unwrap(), (1000.0, -0.01));
        assert!(parse_complex(b"1+2j", 128).is_err());
    }

    #[test]
    fn test_quote_variants() {
        assert_eq!(q("hello\n"), "\"hello\\n\"");
        assert_eq!(q("tab\there \"q\""), "\"tab\\there \\\"q\\\"\"");
        assert_eq!(q("\u{7f}"), "\"\\x7f\"");
        assert_eq!(q("☺"), "\"☺\"");
        assert_eq!(
            String::from_utf8(quote_to_ascii("☺".as_bytes())).unwrap(),
            "\"\\u263a\""
        );
        assert_eq!(
            String::from_utf8(quote_to_graphic("\u{a0}".as_bytes())).unwrap(),
            "\"\u{a0}\""
        );
        assert_eq!(q("\u{a0}"), "\"\\u00a0\"");
        assert_eq!(String::from_utf8(quote(b"\xff")).unwrap(), "\"\\xff\"");
        let mut out = Vec::new();
        append_quoted_rune(&mut out, u32::from('\''), QuoteMode::Plain);
        assert_eq!(out, b"'\\''");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(b"\"a\\tb\"").unwrap(), b"a\tb");
        assert_eq!(unquote(b"'\\u263a'").unwrap(), "☺".as_bytes());
        assert_eq!(unquote(b"`raw\\n`").unwrap(), b"raw\\n");
        assert_eq!(unquote(b"\"\\xff\"").unwrap(), b"\xff");
        assert_eq!(unquote(b"\"\\377\"").unwrap(), b"\xff");
        assert!(unquote(b"'ab'").is_err());
        assert!(unquote(b"\"abc").is_err());
        assert!(unquote(b"\"a\"b").is_err());
        assert_eq!(unquote(b"x").unwrap_err().to_string(), "invalid syntax");
    }

    #[test]
    fn test_quoted_prefix() {
        assert_eq!(quoted_prefix(b"\"hi\" rest").unwrap(), b"\"hi\"");
        assert_eq!(quoted_prefix(b"\"a\\\"b\"c").unwrap(), b"\"a\\\"b\"");
        assert!(quoted_prefix(b"no quote").is_err());
    }

    #[test]
    fn test_unquote_char() {
        let (r, multi, tail) = unquote_char(b"\\u00e9rest", b'"').unwrap();
        assert_eq!((r, multi, tail), (0xe9, true, &b"rest"[..]));
        let (r, multi, _) = unquote_char(b"\\n", b'"').unwrap();
        assert_eq!((r, multi), (u32::from(b'\n'), false));
        assert!(unquote_char(b"\\'", b'"').is_err());
    }

    #[test]
    fn test_can_backquote_and_print() {
        assert!(can_backquote(b"Fran & Freddie's Diner"));
        assert!(!can_backquote(b"`can't`"));
        assert!(!can_backquote(b"line\nbreak"));
        assert!(is_print(u32::from('a')));
        assert!(!is_print(0x7));
        assert!(!is_print(0xa0));
        assert!(is_graphic(0xa0));
        assert!(!is_print(0xD800));
    }
}
