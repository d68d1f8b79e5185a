//! FFI layer for client integration.
//!
//! This module provides C-compatible functions so a client written in
//! another language can apply the server's patches and compute its own
//! outgoing patches with the same rules the server uses.
//! All data crosses the boundary as JSON strings.
//!
//! # Memory Management
//!
//! - Strings returned by `diffsync_*` functions are allocated by Rust
//! - Caller must free them with `diffsync_string_free`
//!
//! # Error Handling
//!
//! Functions return JSON with either:
//! - `{"ok": <result>}` on success
//! - `{"error": "<message>", "category": "<category>"?}` on failure

use crate::{
    diff, Collection, CollectionSchema, Error, ErrorCategory, IdentityPolicy, Patch, PatchContext,
};
use std::ffi::{c_char, CStr, CString};
use std::ptr;

/// Result wrapper for FFI responses.
#[derive(serde::Serialize)]
#[serde(untagged)]
enum FfiResult<T: serde::Serialize> {
    Ok {
        ok: T,
    },
    Err {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<&'static str>,
    },
}

impl<T: serde::Serialize> FfiResult<T> {
    fn ok(value: T) -> Self {
        FfiResult::Ok { ok: value }
    }

    fn err(message: impl Into<String>) -> Self {
        FfiResult::Err {
            error: message.into(),
            category: None,
        }
    }

    fn engine(error: &Error) -> Self {
        FfiResult::Err {
            error: error.to_string(),
            category: Some(category_name(error.category())),
        }
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}

fn category_name(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Malformed => "malformed",
        ErrorCategory::PathResolution => "path",
        ErrorCategory::TypeOrNullability => "type",
        ErrorCategory::TestAssertion => "test",
        ErrorCategory::Persistence => "persistence",
    }
}

/// Convert a Rust string to a C string pointer.
/// Caller must free with `diffsync_string_free`.
fn to_c_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(cs) => cs.into_raw(),
        // String contained null bytes
        Err(_) => CString::new(r#"{"error":"string contained null bytes"}"#)
            .map(CString::into_raw)
            .unwrap_or(ptr::null_mut()),
    }
}

/// Convert a C string pointer to a Rust string.
/// Returns None if pointer is null or invalid UTF-8.
unsafe fn from_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Parse one JSON argument, or produce the error response.
unsafe fn parse_arg<T: serde::de::DeserializeOwned>(
    ptr: *const c_char,
    what: &str,
) -> Result<T, *mut c_char> {
    let Some(text) = from_c_string(ptr) else {
        return Err(to_c_string(
            FfiResult::<()>::err(format!("invalid {} string", what)).to_json(),
        ));
    };
    serde_json::from_str(&text).map_err(|e| {
        to_c_string(FfiResult::<()>::err(format!("{} parse error: {}", what, e)).to_json())
    })
}

/// Free a string allocated by the engine.
///
/// # Safety
/// - `s` must be a valid pointer from a `diffsync_*` function
/// - Must not be called twice on the same pointer
#[no_mangle]
pub unsafe extern "C" fn diffsync_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Apply a patch to a collection.
///
/// Identity writes are accepted, since the typical caller is a client
/// applying the server's outgoing patch.
///
/// # Arguments
/// - `schema_json`: JSON string of CollectionSchema
/// - `collection_json`: JSON array of records
/// - `patch_json`: JSON Patch document
///
/// # Returns
/// JSON string: `{"ok": [records]}` or `{"error": "message", "category": ".."}`
///
/// # Safety
/// - All arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `diffsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn diffsync_apply_patch(
    schema_json: *const c_char,
    collection_json: *const c_char,
    patch_json: *const c_char,
) -> *mut c_char {
    let schema: CollectionSchema = match parse_arg(schema_json, "schema") {
        Ok(s) => s,
        Err(response) => return response,
    };
    let mut collection: Collection = match parse_arg(collection_json, "collection") {
        Ok(c) => c,
        Err(response) => return response,
    };
    let patch: Patch = match parse_arg(patch_json, "patch") {
        Ok(p) => p,
        Err(response) => return response,
    };

    let ctx = PatchContext::new(&schema).with_identity(IdentityPolicy::Accept);
    match patch.apply(&mut collection, &ctx) {
        Ok(()) => to_c_string(FfiResult::ok(collection).to_json()),
        Err(e) => to_c_string(FfiResult::<()>::engine(&e).to_json()),
    }
}

/// Compute the patch that turns `shadow` into `current`.
///
/// # Returns
/// JSON string: `{"ok": [operations]}` or `{"error": "message"}`
///
/// # Safety
/// - All arguments must be valid null-terminated C strings or null
/// - Caller must free the returned string with `diffsync_string_free`
#[no_mangle]
pub unsafe extern "C" fn diffsync_diff(
    schema_json: *const c_char,
    shadow_json: *const c_char,
    current_json: *const c_char,
) -> *mut c_char {
    let schema: CollectionSchema = match parse_arg(schema_json, "schema") {
        Ok(s) => s,
        Err(response) => return response,
    };
    let shadow: Collection = match parse_arg(shadow_json, "shadow") {
        Ok(c) => c,
        Err(response) => return response,
    };
    let current: Collection = match parse_arg(current_json, "current") {
        Ok(c) => c,
        Err(response) => return response,
    };

    to_c_string(FfiResult::ok(diff(&shadow, &current, &schema)).to_json())
}

/// Get the engine version.
///
/// # Returns
/// Static string pointer (do not free)
#[no_mangle]
pub extern "C" fn diffsync_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
