//! Drives the generated shim the way the managed wrapper does: flat
//! arguments in, status checked after every call, buffers handed back.
use crossbind::ir::{TypeId, TypeRef};
use crossbind::marshal::{self, Value};
use crossbind_runtime::{
    CALL_CONTRACT, CALL_ERROR, CALL_PANIC, CALL_SUCCESS, CallStatus, FfiOption, FfiStr, RustBuffer,
};
use dev_test_runner::ffi;

fn status() -> CallStatus {
    CallStatus::default()
}

/// Copy a returned buffer out and release it through the generated free shim.
fn take_string(buf: RustBuffer) -> String {
    let bytes = unsafe { std::slice::from_raw_parts(buf.data, buf.len).to_vec() };
    let mut st = status();
    ffi::demo_rustbuffer_free(buf, &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
    String::from_utf8(bytes).unwrap()
}

fn error_bytes(st: &mut CallStatus) -> Vec<u8> {
    unsafe { st.take_error_buf().into_vec() }
}

fn new_person(name: &str, age: u32) -> u64 {
    let mut st = status();
    let handle = ffi::demo_ctor_person(FfiStr::from_str(name), age, &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
    assert_ne!(handle, 0);
    handle
}

#[test]
fn greet_borrows_the_person() {
    let person = new_person("Randall", 87);

    let mut st = status();
    let greeting = take_string(ffi::demo_fn_greet(person, &mut st));
    assert_eq!(st.code, CALL_SUCCESS);
    assert_eq!(greeting, "Hello, Randall! You are 87 years old.");

    // still valid after the call
    let mut st = status();
    let age = ffi::demo_get_person_age(person, &mut st);
    assert_eq!((st.code, age), (CALL_SUCCESS, 87));
    let name = take_string(ffi::demo_get_person_name(person, &mut st));
    assert_eq!(name, "Randall");

    let mut st = status();
    ffi::demo_free_person(person, &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
}

#[test]
fn freeing_twice_is_harmless() {
    let person = new_person("Ada", 36);
    for _ in 0..2 {
        let mut st = status();
        ffi::demo_free_person(person, &mut st);
        assert_eq!(st.code, CALL_SUCCESS);
    }

    let mut st = status();
    let buf = ffi::demo_get_person_name(person, &mut st);
    assert_eq!(st.code, CALL_CONTRACT);
    assert!(buf.data.is_null());
    let message = String::from_utf8(error_bytes(&mut st)).unwrap();
    assert!(!message.is_empty());
}

#[test]
fn enum_tag_and_payload() {
    let mut st = status();
    let toggle = ffi::demo_ctor_message_toggle(1, &mut st);
    assert_eq!(st.code, CALL_SUCCESS);

    let tag = ffi::demo_tag_message(toggle, &mut st);
    assert_eq!((st.code, tag), (CALL_SUCCESS, 1));
    let item0 = ffi::demo_get_message_toggle_0(toggle, &mut st);
    assert_eq!((st.code, item0), (CALL_SUCCESS, 1));

    let description = take_string(ffi::demo_fn_describe(toggle, &mut st));
    assert_eq!(description, "toggle on");

    ffi::demo_free_message(toggle, &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
}

#[test]
fn struct_variants_round_trip_through_accessors() {
    let mut st = status();
    let kv = ffi::demo_ctor_message_key_value(FfiStr::from_str("lang"), FfiStr::from_str("rust"), &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
    assert_eq!(ffi::demo_tag_message(kv, &mut st), 2);
    let value = take_string(ffi::demo_get_message_key_value_value(kv, &mut st));
    assert_eq!(value, "rust");
    ffi::demo_free_message(kv, &mut st);
}

#[test]
fn wrong_variant_accessor_is_a_contract_violation() {
    let mut st = status();
    let none = ffi::demo_ctor_message_no_data(&mut st);
    assert_eq!(ffi::demo_tag_message(none, &mut st), 0);

    let value = ffi::demo_get_message_toggle_0(none, &mut st);
    assert_eq!((st.code, value), (CALL_CONTRACT, 0));
    let message = String::from_utf8(error_bytes(&mut st)).unwrap();
    assert!(message.contains("Message::Toggle"), "{message}");

    let mut st = status();
    ffi::demo_free_message(none, &mut st);
}

#[test]
fn native_errors_carry_the_encoded_value() {
    let mut st = status();
    let age = ffi::demo_fn_parse_age(FfiStr::from_str("42"), &mut st);
    assert_eq!((st.code, age), (CALL_SUCCESS, 42));

    let mut st = status();
    let age = ffi::demo_fn_parse_age(FfiStr::from_str("old"), &mut st);
    assert_eq!((st.code, age), (CALL_ERROR, 0));
    let error = marshal::decode(&error_bytes(&mut st), &TypeRef::Str).unwrap();
    assert_eq!(error, Value::str("`old` is not an age"));
}

#[test]
fn panics_stop_at_the_boundary() {
    let mut st = status();
    ffi::demo_fn_explode(&mut st);
    assert_eq!(st.code, CALL_PANIC);
    let message = String::from_utf8(error_bytes(&mut st)).unwrap();
    assert_eq!(message, "boom");
}

#[test]
fn invalid_utf8_is_rejected() {
    let bytes = [0xff, 0xfe];
    let view = FfiStr { data: bytes.as_ptr(), len: bytes.len() };
    let mut st = status();
    ffi::demo_fn_parse_age(view, &mut st);
    assert_eq!(st.code, CALL_CONTRACT);
}

#[test]
fn options_cross_as_presence_and_value() {
    let mut st = status();
    let nick = ffi::demo_fn_find_nickname(FfiStr::from_str("Randall"), &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
    let nick = nick.into_option().map(take_string);
    assert_eq!(nick.as_deref(), Some("Randy"));

    let missing = ffi::demo_fn_find_nickname(FfiStr::from_str("Zed"), &mut st);
    assert!(missing.into_option().is_none());

    let lucky = ffi::demo_fn_lucky_number(FfiOption::some(3), &mut st);
    assert_eq!(lucky.into_option(), Some(21));
    let lucky = ffi::demo_fn_lucky_number(FfiOption::none(), &mut st);
    assert_eq!(lucky.into_option(), None);
}

#[test]
fn consuming_calls_invalidate_the_handle() {
    let person = new_person("Grace", 85);

    let mut st = status();
    let renamed = ffi::demo_method_person_rename(person, FfiStr::from_str("Amazing Grace"), &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
    assert!(ffi::demo_method_person_is_adult(renamed, &mut st) != 0);

    // the receiver was moved into the call
    let mut st = status();
    ffi::demo_get_person_age(person, &mut st);
    assert_eq!(st.code, CALL_CONTRACT);

    let mut st = status();
    let adopted = take_string(ffi::demo_fn_adopt(renamed, &mut st));
    assert_eq!(adopted, "Amazing Grace was adopted");
    ffi::demo_get_person_age(renamed, &mut st);
    assert_eq!(st.code, CALL_CONTRACT);
}

#[test]
fn bad_arguments_leave_consumed_handles_alone() {
    let person = new_person("Linus", 54);
    let bytes = [0xc0];
    let view = FfiStr { data: bytes.as_ptr(), len: bytes.len() };

    let mut st = status();
    ffi::demo_method_person_rename(person, view, &mut st);
    assert_eq!(st.code, CALL_CONTRACT);

    // lifting failed before the receiver was taken
    let mut st = status();
    assert_eq!(ffi::demo_get_person_age(person, &mut st), 54);
    ffi::demo_free_person(person, &mut st);
}

#[test]
fn optional_flags_cross_as_bytes() {
    let mut st = status();
    let out = ffi::demo_fn_invert(FfiOption::some(1), &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
    assert_eq!(out.into_option(), Some(0));
    assert_eq!(ffi::demo_fn_invert(FfiOption::none(), &mut st).into_option(), None);
}

#[test]
fn optional_handles_are_cloned_in_and_fresh_out() {
    let ada = new_person("Ada", 36);
    let grace = new_person("Grace", 85);

    let mut st = status();
    let elder = ffi::demo_fn_elder(ada, FfiOption::some(grace), &mut st).into_option();
    assert_eq!(st.code, CALL_SUCCESS);
    let elder = elder.unwrap();
    assert_ne!(elder, grace);
    assert_eq!(ffi::demo_get_person_age(elder, &mut st), 85);
    // the caller still owns both arguments
    assert_eq!(ffi::demo_get_person_age(grace, &mut st), 85);
    assert_eq!(ffi::demo_get_person_age(ada, &mut st), 36);
    assert_eq!(st.code, CALL_SUCCESS);

    let nobody = ffi::demo_fn_elder(ada, FfiOption::none(), &mut st);
    assert!(nobody.into_option().is_none());
    for handle in [ada, grace, elder] {
        ffi::demo_free_person(handle, &mut st);
    }
}

#[test]
fn enum_arguments_are_cloned_and_results_are_fresh() {
    let mut st = status();
    let on = ffi::demo_ctor_message_toggle(1, &mut st);
    let off = ffi::demo_fn_flip(on, &mut st);
    assert_eq!(st.code, CALL_SUCCESS);
    assert_ne!(off, on);
    assert_eq!(ffi::demo_get_message_toggle_0(off, &mut st), 0);
    assert_eq!(ffi::demo_get_message_toggle_0(on, &mut st), 1);
    ffi::demo_free_message(on, &mut st);
    ffi::demo_free_message(off, &mut st);
}

#[test]
fn enum_errors_travel_as_handles() {
    let mut st = status();
    let toggle = ffi::demo_ctor_message_toggle(0, &mut st);
    ffi::demo_fn_require_toggle(toggle, &mut st);
    assert_eq!(st.code, CALL_SUCCESS);

    let kv = ffi::demo_ctor_message_key_value(FfiStr::from_str("lang"), FfiStr::from_str("rust"), &mut st);
    let mut st = status();
    ffi::demo_fn_require_toggle(kv, &mut st);
    assert_eq!(st.code, CALL_ERROR);
    let decoded = marshal::decode(&error_bytes(&mut st), &TypeRef::Handle(TypeId(1))).unwrap();
    let Value::Handle(error) = decoded else { panic!("expected a handle, got {decoded:?}") };

    let mut st = status();
    assert_eq!(ffi::demo_tag_message(error, &mut st), 2);
    let key = take_string(ffi::demo_get_message_key_value_key(error, &mut st));
    assert_eq!(key, "lang");
    for handle in [toggle, kv, error] {
        ffi::demo_free_message(handle, &mut st);
    }
}
