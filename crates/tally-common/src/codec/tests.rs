use super::*;
use crate::protocol::error::TallyError;
use crate::protocol::Metric;
use std::sync::OnceLock;

/// 1024-bit key shared by every test in the crate; generation is slow.
pub(crate) fn test_keypair() -> (RsaPrivateKey, RsaPublicKey) {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    let private = KEY
        .get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap())
        .clone();
    let public = RsaPublicKey::from(&private);
    (private, public)
}

fn sample_batch() -> Vec<Metric> {
    vec![
        Metric::gauge("Alloc", 123.45),
        Metric::gauge("Tiny", 5e-324),
        Metric::gauge("Huge", f64::MAX),
        Metric::gauge("Third", 0.1 + 0.2),
        Metric::counter("PollCount", 5),
        Metric::counter("Negative", i64::MIN),
    ]
}

fn codecs() -> Vec<(&'static str, WireCodec, WireCodec)> {
    let (private, public) = test_keypair();
    vec![
        ("plain", WireCodec::new(), WireCodec::new()),
        (
            "signed",
            WireCodec::new().with_signing_key("k"),
            WireCodec::new().with_signing_key("k"),
        ),
        (
            "encrypted",
            WireCodec::new().with_public_key(public.clone()),
            WireCodec::new().with_private_key(private.clone()),
        ),
        (
            "signed+encrypted",
            WireCodec::new().with_signing_key("k").with_public_key(public),
            WireCodec::new().with_signing_key("k").with_private_key(private),
        ),
    ]
}

#[test]
fn test_roundtrip_all_layer_combinations() {
    let batch = sample_batch();
    for (name, sender, receiver) in codecs() {
        let payload = sender.encode(&batch).unwrap();
        assert!(payload.compressed, "{}", name);

        let decoded: Vec<Metric> = receiver.decode(&payload).unwrap();
        assert_eq!(decoded.len(), batch.len(), "{}", name);
        for (a, b) in decoded.iter().zip(&batch) {
            assert_eq!(a.id, b.id, "{}", name);
            assert_eq!(a.delta, b.delta, "{}", name);
            assert_eq!(
                a.value.map(f64::to_bits),
                b.value.map(f64::to_bits),
                "{}: {}",
                name,
                a.id
            );
        }
    }
}

#[test]
fn test_headers_reflect_layers() {
    let (_, public) = test_keypair();
    let plain = WireCodec::new().encode(&sample_batch()).unwrap();
    assert_eq!(plain.hash, None);
    assert!(!plain.encrypted);

    let full = WireCodec::new()
        .with_signing_key("k")
        .with_public_key(public)
        .encode(&sample_batch())
        .unwrap();
    assert!(full.hash.is_some());
    assert!(full.encrypted);
    assert_eq!(full.body.len() % 128, 0);
}

#[test]
fn test_tag_covers_uncompressed_json() {
    let codec = WireCodec::new().with_signing_key("k");
    let batch = sample_batch();
    let payload = codec.encode(&batch).unwrap();
    let json = serde_json::to_vec(&batch).unwrap();
    assert_eq!(payload.hash, Some(Signer::new("k").sign(&json).unwrap()));
}

#[test]
fn test_tampered_byte_fails_verification() {
    let codec = WireCodec::new().with_signing_key("k");
    let mut json = serde_json::to_vec(&Metric::gauge("Alloc", 1.0)).unwrap();
    let payload = codec.encode_bytes(&json).unwrap();

    // flip one byte after signing, keep the original tag
    let last = json.len() - 2;
    json[last] ^= 0x01;
    let mut tampered = codec.encode_bytes(&json).unwrap();
    tampered.hash = payload.hash;

    let result = codec.decode::<Metric>(&tampered);
    assert!(matches!(result, Err(TallyError::Integrity(_))));
}

#[test]
fn test_wrong_key_fails_verification() {
    let payload = WireCodec::new()
        .with_signing_key("a")
        .encode(&Metric::counter("x", 1))
        .unwrap();
    let result = WireCodec::new().with_signing_key("b").decode::<Metric>(&payload);
    assert!(matches!(result, Err(TallyError::Integrity(_))));
}

#[test]
fn test_unsigned_payload_rejected_when_key_configured() {
    let payload = WireCodec::new().encode(&Metric::counter("x", 1)).unwrap();
    let result = WireCodec::new().with_signing_key("k").decode::<Metric>(&payload);
    assert!(matches!(result, Err(TallyError::Integrity(_))));
}

#[test]
fn test_encrypted_payload_without_private_key_is_not_gzip() {
    let (_, public) = test_keypair();
    let payload = WireCodec::new()
        .with_public_key(public)
        .encode(&Metric::counter("x", 1))
        .unwrap();
    let result = WireCodec::new().decode::<Metric>(&payload);
    assert!(matches!(result, Err(TallyError::Compression(_))));
}
