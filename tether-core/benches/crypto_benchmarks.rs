// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Performance Benchmarks for Crypto and Envelope Operations
//!
//! Run with: cargo bench -p tether-core

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

// =============================================================================
// SYMMETRIC ENCRYPTION BENCHMARKS
// =============================================================================

fn bench_symmetric_encryption(c: &mut Criterion) {
    use tether_core::crypto::{decrypt, encrypt, SymmetricKey};

    let key = SymmetricKey::generate().unwrap();

    let mut group = c.benchmark_group("symmetric_encryption");

    // Small message (ping or ack)
    let small_msg = br#"{"id":1,"jsonrpc":"2.0","result":true}"#;
    group.throughput(Throughput::Bytes(small_msg.len() as u64));
    group.bench_function("encrypt_small", |b| {
        b.iter(|| encrypt(black_box(&key), black_box(small_msg)))
    });

    // Medium message (typical session settle)
    let medium_msg = vec![b'x'; 2048];
    group.throughput(Throughput::Bytes(2048));
    group.bench_function("encrypt_medium_2KB", |b| {
        b.iter(|| encrypt(black_box(&key), black_box(&medium_msg)))
    });

    // Large message (typed data signing request)
    let large_msg = vec![b'x'; 64 * 1024];
    group.throughput(Throughput::Bytes(64 * 1024));
    group.bench_function("encrypt_large_64KB", |b| {
        b.iter(|| encrypt(black_box(&key), black_box(&large_msg)))
    });

    let medium_encrypted = encrypt(&key, &medium_msg).unwrap();
    group.bench_function("decrypt_medium_2KB", |b| {
        b.iter(|| decrypt(black_box(&key), black_box(&medium_encrypted)))
    });

    group.finish();
}

// =============================================================================
// KEY AGREEMENT BENCHMARKS
// =============================================================================

fn bench_key_agreement(c: &mut Criterion) {
    use tether_core::crypto::KeyPair;

    let mut group = c.benchmark_group("key_agreement");

    group.bench_function("x25519_keypair_generate", |b| b.iter(KeyPair::generate));

    let ours = KeyPair::generate();
    let theirs = KeyPair::generate().public_key();
    group.bench_function("x25519_hkdf_agree", |b| {
        b.iter(|| ours.agree(black_box(&theirs)))
    });

    let agreed = ours.agree(&theirs);
    group.bench_function("derive_topic", |b| b.iter(|| agreed.derive_topic()));

    group.finish();
}

// =============================================================================
// ENVELOPE BENCHMARKS
// =============================================================================

fn bench_envelopes(c: &mut Criterion) {
    use std::sync::Arc;

    use serde_json::json;
    use tether_core::kms::KeyManagementService;
    use tether_core::rpc::RpcRequest;
    use tether_core::serializer::{EnvelopeType, Serializer};
    use tether_core::storage::MemoryKeychain;

    let kms = Arc::new(KeyManagementService::new(Arc::new(MemoryKeychain::new())));
    let key = kms.create_sym_key().unwrap();
    let topic = key.derive_topic();
    kms.set_sym_key(&key, &topic).unwrap();
    let serializer = Serializer::new(kms.clone());
    let sender = kms.create_key_pair().unwrap();

    let request = RpcRequest::new(
        "wc_sessionRequest",
        &json!({
            "request": {
                "method": "personal_sign",
                "params": ["0x68656c6c6f", "0xab16a96d359ec26a11e2c2b3d8f8b8942d5bfcdb"]
            },
            "chainId": "eip155:1"
        }),
    )
    .unwrap();

    let mut group = c.benchmark_group("envelopes");

    group.bench_function("serialize_type0", |b| {
        b.iter(|| serializer.serialize(black_box(&topic), black_box(&request), EnvelopeType::Type0))
    });
    group.bench_function("serialize_type1", |b| {
        b.iter(|| {
            serializer.serialize(
                black_box(&topic),
                black_box(&request),
                EnvelopeType::Type1 {
                    sender_public_key: sender,
                },
            )
        })
    });

    let wire = serializer
        .serialize(&topic, &request, EnvelopeType::Type0)
        .unwrap();
    group.bench_function("deserialize_type0", |b| {
        b.iter(|| serializer.deserialize::<RpcRequest>(black_box(&topic), black_box(&wire)))
    });

    group.finish();
}

// =============================================================================
// NAMESPACE BENCHMARKS
// =============================================================================

fn bench_namespaces(c: &mut Criterion) {
    use tether_core::sign::validate_conformance;
    use tether_core::{Account, Blockchain, ProposalNamespace, ProposalNamespaces};
    use tether_core::{SessionNamespace, SessionNamespaces};

    let chains: Vec<Blockchain> = (1..=20)
        .map(|n| Blockchain::new("eip155", &n.to_string()).unwrap())
        .collect();
    let methods: Vec<String> = ["eth_sendTransaction", "personal_sign", "eth_signTypedData"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let events: Vec<String> = vec!["chainChanged".into(), "accountsChanged".into()];

    let mut required = ProposalNamespaces::new();
    required.insert(
        "eip155".into(),
        ProposalNamespace::new(chains.clone(), methods.clone(), events.clone()),
    );
    let mut granted = SessionNamespaces::new();
    granted.insert(
        "eip155".into(),
        SessionNamespace::new(
            chains.iter().map(|chain| {
                Account::new(chain.clone(), "0xab16a96d359ec26a11e2c2b3d8f8b8942d5bfcdb").unwrap()
            }),
            methods,
            events,
        ),
    );

    c.bench_function("validate_conformance_20_chains", |b| {
        b.iter(|| validate_conformance(black_box(&required), black_box(&granted)))
    });
}

criterion_group!(
    benches,
    bench_symmetric_encryption,
    bench_key_agreement,
    bench_envelopes,
    bench_namespaces,
);
criterion_main!(benches);
