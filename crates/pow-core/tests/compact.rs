use pow_core::difficulty::{compact_to_u256, encode_compact};

#[test]
fn compact_to_u256_roundtrip() {
    let bits = 0x1d00ffff;
    let target = compact_to_u256(bits).expect("target");
    let back = encode_compact(target);
    assert_eq!(back, bits);
}

#[test]
fn compact_target_layout() {
    let bits = 0x207fffff;
    let target = compact_to_u256(bits).expect("target");
    let bytes = target.to_big_endian();
    assert!(bytes[..29].iter().all(|b| *b == 0));
    assert_eq!(bytes[29], 0x7f);
    assert_eq!(bytes[30], 0xff);
    assert_eq!(bytes[31], 0xff);
}

#[test]
fn zero_compact_decodes_to_zero_target() {
    let target = compact_to_u256(0).expect("zero decodes cleanly");
    assert!(target.is_zero());
}
