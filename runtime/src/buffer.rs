//! Flat, `#[repr(C)]` value carriers that cross the boundary.
//!
//! - `FfiStr` is a borrowed UTF-8 view handed *into* native code. It is valid
//!   for the duration of one call only.
//! - `RustBuffer` is a native-allocated byte buffer handed *out* of native
//!   code. The receiver owns it and must hand it back to the generated
//!   `*_rustbuffer_free` shim exactly once.
//! - `FfiOption<T>` is a presence byte followed by a `T`-shaped payload.
use std::mem::ManuallyDrop;

use crate::status::CallError;

// ————————————————————————————————————————————————————————————————————————————
// RUST BUFFER
// ————————————————————————————————————————————————————————————————————————————

#[repr(C)]
#[derive(Debug)]
pub struct RustBuffer {
    pub data: *mut u8,
    pub len: usize,
    pub capacity: usize,
}

impl RustBuffer {
    pub const fn empty() -> Self {
        Self { data: std::ptr::null_mut(), len: 0, capacity: 0 }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let mut bytes = ManuallyDrop::new(bytes);
        Self {
            data: bytes.as_mut_ptr(),
            len: bytes.len(),
            capacity: bytes.capacity(),
        }
    }

    pub fn from_string(text: String) -> Self {
        Self::from_vec(text.into_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reclaim the allocation as a `Vec`.
    ///
    /// # Safety
    /// `self` must have been produced by [`RustBuffer::from_vec`] (or be
    /// [`RustBuffer::empty`]) and must not have been reclaimed before.
    pub unsafe fn into_vec(self) -> Vec<u8> {
        if self.data.is_null() {
            return Vec::new();
        }
        unsafe { Vec::from_raw_parts(self.data, self.len, self.capacity) }
    }

    /// Release the allocation.
    ///
    /// # Safety
    /// Same contract as [`RustBuffer::into_vec`].
    pub unsafe fn destroy(self) {
        drop(unsafe { self.into_vec() });
    }

    /// Borrow the contents without taking ownership.
    ///
    /// # Safety
    /// The buffer must still be live.
    pub unsafe fn as_bytes(&self) -> &[u8] {
        if self.data.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }
}

impl Default for RustBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BORROWED STRING VIEW
// ————————————————————————————————————————————————————————————————————————————

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiStr {
    pub data: *const u8,
    pub len: usize,
}

impl FfiStr {
    pub const fn null() -> Self {
        Self { data: std::ptr::null(), len: 0 }
    }

    /// View a Rust string. The view must not outlive `text`.
    pub fn from_str(text: &str) -> Self {
        Self { data: text.as_ptr(), len: text.len() }
    }

    /// Reinterpret the view as `&str`, validating UTF-8.
    ///
    /// A null view is read as the empty string.
    ///
    /// # Safety
    /// `data` must point to `len` readable bytes that stay valid and
    /// unmodified for `'a`.
    pub unsafe fn as_str<'a>(&self) -> Result<&'a str, CallError> {
        if self.data.is_null() {
            return Ok("");
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.data, self.len) };
        Ok(std::str::from_utf8(bytes)?)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// OPTIONAL PAYLOAD
// ————————————————————————————————————————————————————————————————————————————

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FfiOption<T> {
    pub present: u8,
    pub value: T,
}

impl<T: FfiDefault> FfiOption<T> {
    pub fn some(value: T) -> Self {
        Self { present: 1, value }
    }

    pub fn none() -> Self {
        Self { present: 0, value: T::ffi_default() }
    }

    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::some(value),
            None => Self::none(),
        }
    }

    /// Payload contents are ignored when the presence byte is zero.
    pub fn into_option(self) -> Option<T> {
        if self.present != 0 { Some(self.value) } else { None }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// DEFAULT RETURN VALUES
// ————————————————————————————————————————————————————————————————————————————

/// Value returned on the ABI return channel when a call fails.
pub trait FfiDefault {
    fn ffi_default() -> Self;
}

macro_rules! zero_default {
    ($($ty:ty),* $(,)?) => {
        $(impl FfiDefault for $ty {
            fn ffi_default() -> Self { Default::default() }
        })*
    };
}

zero_default!((), u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl FfiDefault for RustBuffer {
    fn ffi_default() -> Self {
        Self::empty()
    }
}

impl FfiDefault for FfiStr {
    fn ffi_default() -> Self {
        Self::null()
    }
}

impl<T: FfiDefault> FfiDefault for FfiOption<T> {
    fn ffi_default() -> Self {
        Self::none()
    }
}
