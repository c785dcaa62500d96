//! C ABI for Koko Keywords
//!
//! The language shims (Node.js, Python, Ruby, Go) load this library and call
//! two functions:
//!
//! ```c
//! int c_koko_keywords_match(const char *input, const char *filter, const char *version);
//! const char *c_koko_keywords_error_description(long code);
//! ```
//!
//! `c_koko_keywords_match` returns `1` on a match, `0` on no match and a
//! negative error code otherwise. The process-wide matcher is created from
//! the environment on first use.

use koko_keywords_core::error::{error_description, ErrorCode, KeywordsError};
use koko_keywords_core::BindingMatcher;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_long};
use std::panic::{catch_unwind, AssertUnwindSafe};

static MATCHER: Lazy<Result<BindingMatcher, KeywordsError>> = Lazy::new(|| {
    let matcher = BindingMatcher::from_env();
    match &matcher {
        Ok(m) => tracing::debug!("Initialized {}", m.version()),
        Err(e) => e.log(),
    }
    matcher
});

/// NUL-terminated descriptions, alive for the whole process
static DESCRIPTIONS: Lazy<HashMap<i32, CString>> = Lazy::new(|| {
    ErrorCode::ALL
        .iter()
        .filter_map(|code| {
            CString::new(code.description())
                .ok()
                .map(|description| (code.as_i32(), description))
        })
        .collect()
});

static UNKNOWN: Lazy<CString> =
    Lazy::new(|| CString::new(error_description(0)).unwrap_or_default());

/// Match `input` against the keyword catalog
///
/// # Safety
///
/// Each argument must be NULL or point to a NUL-terminated string that
/// stays valid for the duration of the call. `filter` and `version` may be
/// NULL or empty; a NULL `input` is rejected with the parse failure code.
#[no_mangle]
pub unsafe extern "C" fn c_koko_keywords_match(
    input: *const c_char,
    filter: *const c_char,
    version: *const c_char,
) -> c_int {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        match_args(input, filter, version).map_or_else(
            |e| e.code().as_i32(),
            |(input, filter, version)| match &*MATCHER {
                Ok(matcher) => matcher.match_code(input, filter, version),
                Err(e) => e.code().as_i32(),
            },
        )
    }));

    outcome.unwrap_or_else(|_| {
        tracing::error!("Keyword match panicked");
        ErrorCode::CacheRefreshFailure.as_i32()
    })
}

/// Same as [`c_koko_keywords_match`], under the name the Python shim loads
///
/// # Safety
///
/// See [`c_koko_keywords_match`].
#[no_mangle]
pub unsafe extern "C" fn koko_keywords_match(
    input: *const c_char,
    filter: *const c_char,
    version: *const c_char,
) -> c_int {
    c_koko_keywords_match(input, filter, version)
}

/// Human-readable description of a code returned by the match functions
///
/// The returned string is static; callers must not free it.
#[no_mangle]
pub extern "C" fn c_koko_keywords_error_description(code: c_long) -> *const c_char {
    let code = i64::from(code);
    i32::try_from(code)
        .ok()
        .and_then(|code| DESCRIPTIONS.get(&code))
        .unwrap_or_else(|| &*UNKNOWN)
        .as_ptr()
}

type MatchArgs<'a> = (&'a str, Option<&'a str>, Option<&'a str>);

unsafe fn match_args<'a>(
    input: *const c_char,
    filter: *const c_char,
    version: *const c_char,
) -> Result<MatchArgs<'a>, KeywordsError> {
    let input = c_str(input, "input")?
        .ok_or_else(|| KeywordsError::parse_msg("input is NULL"))?;
    Ok((input, c_str(filter, "filter")?, c_str(version, "version")?))
}

unsafe fn c_str<'a>(ptr: *const c_char, name: &str) -> Result<Option<&'a str>, KeywordsError> {
    if ptr.is_null() {
        return Ok(None);
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(Some)
        .map_err(|e| KeywordsError::parse(format!("{name} is not valid UTF-8"), e))
}
