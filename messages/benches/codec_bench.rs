use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fedchain_crypto::keypair_from_seed;
use fedchain_messages::{Acknowledgement, EndOfMinute, Message, SignedPayload};
use fedchain_protocol::{Decode, Encode};
use fedchain_types::{Hash, Timestamp};

fn bench_codec(c: &mut Criterion) {
    let key = keypair_from_seed(&[42; 32]);
    let mut ack = Acknowledgement::new(
        Timestamp::from_secs(1_700_000_000),
        100,
        4,
        17,
        Hash::new([1; 32]),
        Hash::new([2; 32]),
    );
    ack.sign(&key).unwrap();
    let msg = Message::Acknowledgement(ack);
    let bytes = msg.encode().unwrap();

    c.bench_function("ack_encode", |b| b.iter(|| black_box(&msg).encode().unwrap()));

    c.bench_function("ack_decode", |b| {
        b.iter(|| Message::decode_prefix(black_box(&bytes)).unwrap())
    });

    c.bench_function("ack_hash", |b| b.iter(|| black_box(&msg).hash().unwrap()));

    c.bench_function("eom_sign", |b| {
        b.iter(|| {
            let mut eom = EndOfMinute::new(Timestamp::from_secs(1), 9, 100, 0, 17);
            eom.sign(black_box(&key)).unwrap();
            eom
        })
    });

    c.bench_function("ack_verify", |b| b.iter(|| black_box(&msg).verify()));
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
