//! FFI bindings for Aqua Index
//!
//! This module provides C-compatible functions for calling the engine from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `aqua_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::encoder::ReportEncoder;
use crate::error::ComputeError;
use crate::indices::IndexCalculator;
use crate::ingest::RowIngestor;
use crate::pipeline::assess_ingested;
use crate::standards::{StandardId, StandardsRegistry};
use crate::types::MetalConcentration;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// NULL selects WHO
unsafe fn standard_arg(standard: *const c_char) -> Result<StandardId, ComputeError> {
    if standard.is_null() {
        return Ok(StandardId::Who);
    }
    match cstr_to_string(standard) {
        Some(s) => s.parse(),
        None => Err(ComputeError::UnknownStandard(
            "standard is not valid UTF-8".to_string(),
        )),
    }
}

fn assess_rows_json(rows_json: &str, standard: StandardId) -> Result<String, ComputeError> {
    let records = RowIngestor::parse_array(rows_json)?;
    let ingested = RowIngestor::ingest(records);
    let batch = assess_ingested(ingested, standard, &StandardsRegistry::builtin())?;
    ReportEncoder::new().encode_to_json(&batch)
}

fn compute_indices_json(
    concentrations_json: &str,
    standard: StandardId,
) -> Result<String, ComputeError> {
    let concentrations: MetalConcentration = serde_json::from_str(concentrations_json)?;
    let registry = StandardsRegistry::builtin();
    let standard = registry.resolve(standard)?;
    let indices = IndexCalculator::compute(&concentrations, &standard.limits);
    serde_json::to_string(&indices).map_err(|e| ComputeError::EncodingError(e.to_string()))
}

// ============================================================================
// Stateless API
// ============================================================================

/// Assess a JSON array of sample rows and return the report JSON.
///
/// # Safety
/// - `rows_json` must be a valid null-terminated C string.
/// - `standard` must be NULL (WHO) or a valid null-terminated C string ("WHO" or "BIS").
/// - Returns a newly allocated string that must be freed with `aqua_free_string`.
/// - Returns NULL on error; call `aqua_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn aqua_assess_json(
    rows_json: *const c_char,
    standard: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(rows_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid rows JSON string pointer");
            return ptr::null_mut();
        }
    };

    let result = standard_arg(standard).and_then(|id| assess_rows_json(&json_str, id));
    match result {
        Ok(report) => string_to_cstr(&report),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Compute indices for one concentration object (`{"As": .., "Cd": .., ...}`).
///
/// # Safety
/// - `concentrations_json` must be a valid null-terminated C string.
/// - `standard` must be NULL (WHO) or a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `aqua_free_string`.
/// - Returns NULL on error; call `aqua_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn aqua_compute_indices_json(
    concentrations_json: *const c_char,
    standard: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(concentrations_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid concentrations JSON string pointer");
            return ptr::null_mut();
        }
    };

    let result = standard_arg(standard).and_then(|id| compute_indices_json(&json_str, id));
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by an `aqua_*` function.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an `aqua_*` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn aqua_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `aqua_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn aqua_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn aqua_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
