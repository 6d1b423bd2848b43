//! Request Builder Tests
//!
//! Key validation and the extras layout of each command.

use memlink::protocol::{
    build_add_request, build_append_request, build_counter_request, build_delete_request,
    build_flush_request, build_gat_request, build_get_request, build_noop_request,
    build_sasl_auth_request, build_sasl_list_mechs_request, build_set_request,
    build_touch_request, Opcode, MAX_KEY_LENGTH,
};
use memlink::CacheError;

#[test]
fn test_empty_key_rejected() {
    let err = build_get_request("").unwrap_err();
    assert!(matches!(err, CacheError::InvalidKey(_)));
}

#[test]
fn test_key_length_limit() {
    let longest = "k".repeat(MAX_KEY_LENGTH);
    assert!(build_get_request(&longest).is_ok());

    let too_long = "k".repeat(MAX_KEY_LENGTH + 1);
    assert!(matches!(
        build_set_request(&too_long, 0, 0, vec![]),
        Err(CacheError::InvalidKey(_))
    ));
}

#[test]
fn test_multibyte_key_measured_in_bytes() {
    // 84 three-byte characters = 252 bytes
    let key = "键".repeat(84);
    assert!(matches!(
        build_delete_request(&key),
        Err(CacheError::InvalidKey(_))
    ));
}

#[test]
fn test_set_extras_layout() {
    let request = build_set_request("k", 0xdeadbeef, 3600, b"v".to_vec()).unwrap();

    assert_eq!(request.opcode(), Opcode::Set);
    assert_eq!(
        request.extras(),
        &[0xde, 0xad, 0xbe, 0xef, 0x00, 0x00, 0x0e, 0x10]
    );
    assert_eq!(request.flags(), Some(0xdeadbeef));
    assert_eq!(request.expiry(), Some(3600));
    assert_eq!(request.opaque(), 0);
}

#[test]
fn test_with_opaque_keeps_content() {
    let request = build_add_request("k", 1, 2, b"v".to_vec()).unwrap();
    let stamped = request.clone().with_opaque(99);

    assert_eq!(stamped.opaque(), 99);
    assert_eq!(stamped.key(), request.key());
    assert_eq!(stamped.extras(), request.extras());
    assert_eq!(stamped.value(), request.value());
}

#[test]
fn test_counter_extras_layout() {
    let request = build_counter_request(Opcode::Increment, "hits", 5, 10, 0).unwrap();
    let extras = request.extras();

    assert_eq!(extras.len(), 20);
    assert_eq!(&extras[0..8], &5u64.to_be_bytes());
    assert_eq!(&extras[8..16], &10u64.to_be_bytes());
    assert_eq!(&extras[16..20], &0u32.to_be_bytes());
}

#[test]
fn test_counter_rejects_non_counter_opcode() {
    assert!(build_counter_request(Opcode::Set, "hits", 1, 0, 0).is_err());
}

#[test]
fn test_touch_and_gat_carry_expiry() {
    let touch = build_touch_request("k", 30).unwrap();
    let gat = build_gat_request("k", 45).unwrap();

    assert_eq!(touch.extras(), &30u32.to_be_bytes());
    assert_eq!(touch.expiry(), Some(30));
    assert_eq!(gat.opcode(), Opcode::GetAndTouch);
    assert_eq!(gat.expiry(), Some(45));
}

#[test]
fn test_flush_extras_only_with_delay() {
    assert!(build_flush_request(0).extras().is_empty());
    assert_eq!(build_flush_request(10).extras(), &10u32.to_be_bytes());
}

#[test]
fn test_keyless_commands() {
    assert!(build_noop_request().key().is_empty());
    assert!(build_sasl_list_mechs_request().key().is_empty());
    assert!(!Opcode::NoOp.requires_key());
    assert!(Opcode::Get.requires_key());
}

#[test]
fn test_append_carries_raw_value() {
    let request = build_append_request("k", b"tail".to_vec()).unwrap();
    assert!(request.extras().is_empty());
    assert_eq!(request.value(), b"tail");
}

#[test]
fn test_sasl_plain_payload() {
    let request = build_sasl_auth_request("user", "pass");

    assert_eq!(request.opcode(), Opcode::SaslAuth);
    assert_eq!(request.key(), b"PLAIN");
    assert_eq!(request.value(), b"\0user\0pass");
}
