//! Type definitions, enums and library options.

use std::time::Duration;

use once_cell::sync::Lazy;

/// Outcome of a fallible exported call.
///
/// Returned by every operation that can fail for reasons outside the
/// caller's control. `Ok` is always 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Success.
    #[default]
    Ok = 0,
    /// Malformed input (bad base64, bad JSON, unparseable number).
    Syntax = 1,
    /// Value or parameter out of range.
    Range = 2,
    /// Input ended before a complete item could be read.
    Eof = 3,
    /// Anything else (I/O, network, archive errors).
    Other = 100,
}

impl From<Status> for i32 {
    fn from(status: Status) -> i32 {
        status as i32
    }
}

/// Kind of a decoded JSON value.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonKind {
    /// `null`.
    #[default]
    Null = 0,
    /// `true` or `false`.
    Bool = 1,
    /// Any number, kept as source text.
    Number = 2,
    /// String.
    String = 3,
    /// Array.
    Array = 4,
    /// Object.
    Object = 5,
}

/// Kind of an XML token.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlTokenKind {
    /// `<name ...>`.
    StartElement = 1,
    /// `</name>`.
    EndElement = 2,
    /// Text or CDATA.
    CharData = 3,
    /// `<!-- ... -->`.
    Comment = 4,
    /// `<!...>`.
    Directive = 5,
    /// `<?target ...?>`.
    ProcInst = 6,
}

/// Bit order for LZW streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LzwOrder {
    /// Least significant bits first (GIF).
    #[default]
    Lsb,
    /// Most significant bits first (TIFF, PDF).
    Msb,
}

impl From<LzwOrder> for i32 {
    fn from(order: LzwOrder) -> i32 {
        match order {
            LzwOrder::Lsb => 0,
            LzwOrder::Msb => 1,
        }
    }
}

impl TryFrom<i32> for LzwOrder {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(LzwOrder::Lsb),
            1 => Ok(LzwOrder::Msb),
            other => Err(other),
        }
    }
}

/// Seek origin for readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekWhence {
    /// Seek from the beginning.
    #[default]
    Set,
    /// Seek from the current position.
    Current,
    /// Seek from the end.
    End,
}

impl TryFrom<i32> for SeekWhence {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, i32> {
        match value {
            0 => Ok(SeekWhence::Set),
            1 => Ok(SeekWhence::Current),
            2 => Ok(SeekWhence::End),
            other => Err(other),
        }
    }
}

/// Library options, read once from the environment.
#[derive(Debug, Clone)]
pub struct Options {
    /// `tracing` filter directive (`FATSTD_LOG`, default "warn").
    pub log_filter: String,
    /// Requests an HTTP server keeps before dropping the oldest
    /// (`FATSTD_HTTP_QUEUE`, default 64).
    pub http_queue: usize,
    /// Overall timeout of an HTTP client round trip
    /// (`FATSTD_HTTP_TIMEOUT_MS`, default 30000).
    pub http_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_filter: "warn".to_string(),
            http_queue: 64,
            http_timeout: Duration::from_millis(30_000),
        }
    }
}

impl Options {
    /// Build options from `FATSTD_*` environment variables.
    ///
    /// Unset or unparseable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut opts = Self::default();
        if let Some(filter) = lookup("FATSTD_LOG").filter(|s| !s.trim().is_empty()) {
            opts.log_filter = filter;
        }
        if let Some(n) = lookup("FATSTD_HTTP_QUEUE").and_then(|s| s.trim().parse::<usize>().ok()) {
            if n > 0 {
                opts.http_queue = n;
            }
        }
        if let Some(ms) =
            lookup("FATSTD_HTTP_TIMEOUT_MS").and_then(|s| s.trim().parse::<u64>().ok())
        {
            if ms > 0 {
                opts.http_timeout = Duration::from_millis(ms);
            }
        }
        opts
    }
}

static OPTIONS: Lazy<Options> = Lazy::new(Options::from_env);

/// Options in effect for this process.
pub fn options() -> &'static Options {
    &OPTIONS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_status_values() {
        assert_eq!(i32::from(Status::Ok), 0);
        assert_eq!(i32::from(Status::Syntax), 1);
        assert_eq!(i32::from(Status::Range), 2);
        assert_eq!(i32::from(Status::Eof), 3);
        assert_eq!(i32::from(Status::Other), 100);
    }

    #[test]
    fn test_options_defaults() {
        let opts = Options::from_lookup(|_| None);
        assert_eq!(opts.log_filter, "warn");
        assert_eq!(opts.http_queue, 64);
        assert_eq!(opts.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_options_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("FATSTD_LOG", "fatstd=debug"),
            ("FATSTD_HTTP_QUEUE", "8"),
            ("FATSTD_HTTP_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let opts = Options::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(opts.log_filter, "fatstd=debug");
        assert_eq!(opts.http_queue, 8);
        assert_eq!(opts.http_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_options_ignore_garbage() {
        let opts = Options::from_lookup(|k| match k {
            "FATSTD_HTTP_QUEUE" => Some("lots".to_string()),
            "FATSTD_HTTP_TIMEOUT_MS" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(opts.http_queue, 64);
        assert_eq!(opts.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_enum_conversions() {
        assert_eq!(SeekWhence::try_from(2), Ok(SeekWhence::End));
        assert_eq!(SeekWhence::try_from(3), Err(3));
        assert_eq!(LzwOrder::try_from(1), Ok(LzwOrder::Msb));
        assert_eq!(i32::from(LzwOrder::Lsb), 0);
    }
}
