//! Support library for crossbind-generated native shims.
//!
//! Generated code refers to this crate by path (default
//! `::crossbind_runtime`); nothing here knows about any particular schema.
pub mod buffer;
pub mod handle;
pub mod status;
pub mod wire;

pub use buffer::{FfiDefault, FfiOption, FfiStr, RustBuffer};
pub use handle::{HandleError, HandleMap};
pub use status::{
    CALL_CONTRACT, CALL_ERROR, CALL_PANIC, CALL_SUCCESS, CallError, CallStatus, rust_call,
};
pub use wire::{WireError, WireReader, WireWriter};
