//! Call status channel and the panic-trapping call wrapper every generated
//! shim runs its body through.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

use crate::buffer::{FfiDefault, RustBuffer};
use crate::handle::HandleError;
use crate::wire::WireError;

pub const CALL_SUCCESS: i8 = 0;
/// The native function returned `Err`; `error_buf` holds the wire-encoded
/// error value.
pub const CALL_ERROR: i8 = 1;
/// The native function panicked; `error_buf` holds the UTF-8 message.
pub const CALL_PANIC: i8 = 2;
/// The caller broke the boundary contract (stale handle, bad UTF-8, variant
/// mismatch); `error_buf` holds the UTF-8 message.
pub const CALL_CONTRACT: i8 = 3;

#[repr(C)]
#[derive(Debug, Default)]
pub struct CallStatus {
    pub code: i8,
    pub error_buf: RustBuffer,
}

impl CallStatus {
    pub fn is_success(&self) -> bool {
        self.code == CALL_SUCCESS
    }

    /// Take the error buffer out, leaving an empty one behind.
    pub fn take_error_buf(&mut self) -> RustBuffer {
        std::mem::take(&mut self.error_buf)
    }

    /// A status reused without its buffer taken still owns that buffer; it
    /// is released before the new payload goes in. The status must be
    /// zeroed or hold a buffer this crate produced.
    fn fail(&mut self, code: i8, payload: Vec<u8>) {
        let previous = std::mem::replace(&mut self.error_buf, RustBuffer::from_vec(payload));
        unsafe { previous.destroy() };
        self.code = code;
    }
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("native error ({} encoded bytes)", .0.len())]
    Native(Vec<u8>),
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[error("string argument is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("failed to encode native error: {0}")]
    Wire(#[from] WireError),
    #[error("`{enum_name}::{variant}` accessor called on a value holding another variant")]
    VariantMismatch {
        enum_name: &'static str,
        variant: &'static str,
    },
}

impl CallError {
    pub fn native(payload: Vec<u8>) -> Self {
        CallError::Native(payload)
    }

    pub fn variant_mismatch(enum_name: &'static str, variant: &'static str) -> Self {
        CallError::VariantMismatch { enum_name, variant }
    }
}

/// Run a shim body, trapping panics so they never unwind into the caller.
///
/// On success `status` is reset to [`CALL_SUCCESS`]; otherwise it carries the
/// failure and the ABI default of `R` is returned.
pub fn rust_call<R, F>(status: &mut CallStatus, body: F) -> R
where
    R: FfiDefault,
    F: FnOnce() -> Result<R, CallError>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => {
            status.code = CALL_SUCCESS;
            value
        }
        Ok(Err(CallError::Native(payload))) => {
            status.fail(CALL_ERROR, payload);
            R::ffi_default()
        }
        Ok(Err(err)) => {
            tracing::debug!(error = %err, "boundary contract violation");
            status.fail(CALL_CONTRACT, err.to_string().into_bytes());
            R::ffi_default()
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(%message, "native panic trapped at the boundary");
            status.fail(CALL_PANIC, message.into_bytes());
            R::ffi_default()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "native code panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_text(status: &mut CallStatus) -> String {
        let bytes = unsafe { status.take_error_buf().into_vec() };
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn success_returns_value() {
        let mut status = CallStatus::default();
        let out: u32 = rust_call(&mut status, || Ok(5));
        assert_eq!(out, 5);
        assert!(status.is_success());
    }

    #[test]
    fn native_error_keeps_payload() {
        let mut status = CallStatus::default();
        let out: u64 = rust_call(&mut status, || Err(CallError::native(vec![9, 8])));
        assert_eq!(out, 0);
        assert_eq!(status.code, CALL_ERROR);
        let payload = unsafe { status.take_error_buf().into_vec() };
        assert_eq!(payload, vec![9, 8]);
    }

    #[test]
    fn panic_is_trapped_with_message() {
        let mut status = CallStatus::default();
        let out: RustBuffer = rust_call(&mut status, || panic!("boom {}", 1));
        assert!(out.data.is_null());
        assert_eq!(status.code, CALL_PANIC);
        assert_eq!(error_text(&mut status), "boom 1");
    }

    #[test]
    fn reused_status_replaces_its_error() {
        let mut status = CallStatus::default();
        let _: u8 = rust_call(&mut status, || Err(CallError::native(vec![1; 64])));
        let _: u8 = rust_call(&mut status, || Err(CallError::native(vec![2, 2])));
        assert_eq!(status.code, CALL_ERROR);
        let payload = unsafe { status.take_error_buf().into_vec() };
        assert_eq!(payload, vec![2, 2]);
        assert!(status.error_buf.data.is_null());
    }

    #[test]
    fn stale_handle_is_a_contract_violation() {
        let mut status = CallStatus::default();
        let _: () = rust_call(&mut status, || Err(HandleError::Stale(7).into()));
        assert_eq!(status.code, CALL_CONTRACT);
        assert!(error_text(&mut status).contains("stale"));
    }
}
