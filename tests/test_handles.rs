//! Handle protocol: uniqueness, independent ownership and fatal misuse.
//!
//! Misuse aborts the process, so each fatal scenario re-runs this test
//! binary filtered down to `fatal_child` with the scenario in the
//! environment and checks that the child died.

mod common;

use std::process::Command;

use common::{bytes, take_bytes};
use fatstd::bytes::{
    fat_BytesArrayFree, fat_BytesArrayGet, fat_BytesArrayLen, fat_BytesFree, fat_BytesLen,
    fat_BytesSplit,
};
use fatstd::reader::{fat_BytesReaderFree, fat_BytesReaderNew, fat_BytesReaderRead};
use fatstd::FatBytes;

const SCENARIO_VAR: &str = "FATSTD_FATAL_SCENARIO";

#[test]
fn test_allocations_are_unique_and_nonzero() {
    let handles: Vec<FatBytes> = (0..500).map(|_| bytes(b"x")).collect();
    let mut raw: Vec<usize> = handles.iter().map(|h| h.raw()).collect();
    assert!(raw.iter().all(|&h| h != 0));
    raw.sort_unstable();
    raw.dedup();
    assert_eq!(raw.len(), handles.len());
    for h in handles {
        fat_BytesFree(h);
    }
}

#[test]
fn test_tokens_are_not_reused() {
    let first = bytes(b"a");
    let token = first.raw();
    fat_BytesFree(first);
    let later: Vec<FatBytes> = (0..64).map(|_| bytes(b"b")).collect();
    assert!(later.iter().all(|h| h.raw() != token));
    for h in later {
        fat_BytesFree(h);
    }
}

#[test]
fn test_array_elements_are_independent() {
    let src = bytes(b"a,b,c");
    let sep = bytes(b",");
    let arr = fat_BytesSplit(src, sep);
    fat_BytesFree(src);
    fat_BytesFree(sep);
    assert_eq!(fat_BytesArrayLen(arr), 3);

    let e0 = fat_BytesArrayGet(arr, 0);
    let e1 = fat_BytesArrayGet(arr, 1);
    let e2 = fat_BytesArrayGet(arr, 2);
    fat_BytesFree(e0);
    assert_eq!(take_bytes(e1), b"b");
    assert_eq!(take_bytes(e2), b"c");

    let again_a = fat_BytesArrayGet(arr, 1);
    let again_b = fat_BytesArrayGet(arr, 1);
    assert_ne!(again_a, again_b, "each get returns a fresh handle");
    fat_BytesFree(again_a);
    fat_BytesFree(again_b);
    fat_BytesArrayFree(arr);
}

#[test]
fn test_short_read_sets_eof() {
    let b = bytes(b"abc");
    let r = fat_BytesReaderNew(b);
    fat_BytesFree(b);
    let mut dst = [0u8; 10];
    let mut eof = false;
    let n = unsafe { fat_BytesReaderRead(r, dst.as_mut_ptr().cast(), dst.len(), &mut eof) };
    assert_eq!(n, 3);
    assert!(eof);
    assert_eq!(&dst[..3], b"abc");
    fat_BytesReaderFree(r);
}

/// Body of the child process; does nothing when run normally.
#[test]
fn fatal_child() {
    let Ok(scenario) = std::env::var(SCENARIO_VAR) else {
        return;
    };
    match scenario.as_str() {
        "double_free" => {
            let b = bytes(b"x");
            fat_BytesFree(b);
            fat_BytesFree(b);
        }
        "use_after_free" => {
            let b = bytes(b"x");
            fat_BytesFree(b);
            fat_BytesLen(b);
        }
        "zero_handle" => {
            fat_BytesLen(FatBytes::invalid());
        }
        "unknown_handle" => {
            fat_BytesLen(FatBytes::from_raw(usize::MAX - 7));
        }
        "wrong_kind" => {
            let b = bytes(b"x");
            fat_BytesArrayLen(fatstd::FatBytesArray::from_raw(b.raw()));
        }
        "index_out_of_range" => {
            let src = bytes(b"a,b");
            let sep = bytes(b",");
            let arr = fat_BytesSplit(src, sep);
            fat_BytesArrayGet(arr, 2);
        }
        "null_out_param" => {
            let input = bytes(b"{}");
            let mut err = fatstd::FatError::invalid();
            unsafe { fatstd::json::fat_JsonUnmarshal(input, std::ptr::null_mut(), &mut err) };
        }
        other => panic!("unknown scenario {}", other),
    }
    // Reaching here means the misuse went unnoticed.
    std::process::exit(0);
}

fn run_fatal(scenario: &str) -> std::process::Output {
    let exe = std::env::current_exe().expect("test binary path");
    Command::new(exe)
        .args(["fatal_child", "--exact", "--nocapture", "--test-threads=1"])
        .env(SCENARIO_VAR, scenario)
        .output()
        .expect("spawn child test process")
}

fn assert_fatal(scenario: &str) {
    let out = run_fatal(scenario);
    assert!(!out.status.success(), "{} should abort the process", scenario);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("fatal:"), "{}: stderr was {:?}", scenario, stderr);
}

#[test]
fn test_double_free_is_fatal() {
    assert_fatal("double_free");
}

#[test]
fn test_use_after_free_is_fatal() {
    assert_fatal("use_after_free");
}

#[test]
fn test_zero_handle_is_fatal() {
    assert_fatal("zero_handle");
}

#[test]
fn test_unknown_handle_is_fatal() {
    assert_fatal("unknown_handle");
}

#[test]
fn test_wrong_kind_is_fatal() {
    assert_fatal("wrong_kind");
}

#[test]
fn test_index_out_of_range_is_fatal() {
    assert_fatal("index_out_of_range");
}

#[test]
fn test_null_out_param_is_fatal() {
    assert_fatal("null_out_param");
}
