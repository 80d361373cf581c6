//! Deterministic wire-format test vectors for the duskwire protocol (§6).
//!
//! Generates `tests/fixtures/test_vectors.json`, the ground truth other
//! implementations can check their own encoders/decoders against.
//!
//! Usage:
//!   duskwire-testvec              # Generate test_vectors.json
//!   duskwire-testvec --verify     # Verify an existing file matches

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use duskwire_types::addr::{IpPort, PackedNode};

#[derive(Serialize, Deserialize)]
struct TestVectors {
    version: String,
    generated_by: String,
    vectors: BTreeMap<String, TestVector>,
}

#[derive(Serialize, Deserialize)]
struct TestVector {
    description: String,
    inputs: BTreeMap<String, String>,
    outputs: BTreeMap<String, String>,
}

fn generate_blake3_vectors() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    let hash = duskwire_crypto::blake3::hash(b"duskwire test vector 1");
    vectors.insert(
        "blake3_basic_hash".to_string(),
        TestVector {
            description: "BLAKE3::hash(b\"duskwire test vector 1\")".to_string(),
            inputs: BTreeMap::from([("data".to_string(), "duskwire test vector 1".to_string())]),
            outputs: BTreeMap::from([("hash".to_string(), hex::encode(hash))]),
        },
    );

    let key = duskwire_crypto::blake3::derive_key(
        duskwire_crypto::blake3::contexts::ONION_HOP_KEY,
        &[0u8; 32],
    );
    vectors.insert(
        "blake3_derive_key_onion_hop".to_string(),
        TestVector {
            description: "BLAKE3::derive_key(\"duskwire v1 onion-hop-key\", 0x00*32)".to_string(),
            inputs: BTreeMap::from([
                (
                    "context".to_string(),
                    duskwire_crypto::blake3::contexts::ONION_HOP_KEY.to_string(),
                ),
                ("key_material".to_string(), hex::encode([0u8; 32])),
            ]),
            outputs: BTreeMap::from([("derived_key".to_string(), hex::encode(key))]),
        },
    );

    let k = duskwire_crypto::blake3::derive_key(duskwire_crypto::blake3::contexts::COVER_TOKEN, b"");
    let mac = duskwire_crypto::blake3::keyed_hash(&k, &[0xAAu8; 16]);
    vectors.insert(
        "blake3_keyed_hash_cover_token".to_string(),
        TestVector {
            description: "BLAKE3::keyed_hash(K, 0xAA*16) where K = derive_key(\"duskwire v1 cover-token\", \"\")".to_string(),
            inputs: BTreeMap::from([
                ("key".to_string(), hex::encode(k)),
                ("message".to_string(), hex::encode([0xAAu8; 16])),
            ]),
            outputs: BTreeMap::from([("mac".to_string(), hex::encode(mac))]),
        },
    );

    let a = [0x11u8; 32];
    let b = [0x22u8; 32];
    let dist = duskwire_crypto::blake3::xor_distance(&a, &b);
    vectors.insert(
        "xor_distance".to_string(),
        TestVector {
            description: "XOR distance between two 32-byte keys".to_string(),
            inputs: BTreeMap::from([
                ("a".to_string(), hex::encode(a)),
                ("b".to_string(), hex::encode(b)),
            ]),
            outputs: BTreeMap::from([("distance".to_string(), hex::encode(dist))]),
        },
    );

    vectors
}

fn generate_hmac_vectors() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    let key = [0u8; 32];
    let data = b"duskwire cookie payload";
    let tag = duskwire_crypto::sha2_hmac::hmac(&key, data);
    vectors.insert(
        "hmac_sha256_basic".to_string(),
        TestVector {
            description: "HMAC-SHA256(key=0x00*32, \"duskwire cookie payload\")".to_string(),
            inputs: BTreeMap::from([
                ("key".to_string(), hex::encode(key)),
                ("data".to_string(), hex::encode(data)),
            ]),
            outputs: BTreeMap::from([("tag".to_string(), hex::encode(tag))]),
        },
    );

    vectors
}

fn generate_addr_vectors() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    let ip = IpPort::from_v4(std::net::Ipv4Addr::new(198, 51, 100, 7), 33445);
    let node = PackedNode {
        ip_port: ip,
        public_key: [0x42u8; 32],
    };
    let encoded = duskwire_dht::packets::encode_packed_node(&node);
    vectors.insert(
        "packed_node_v4".to_string(),
        TestVector {
            description: "PackedNode encoding: [family:1][ip:4][port:2][pk:32] for an IPv4 node"
                .to_string(),
            inputs: BTreeMap::from([
                ("ip".to_string(), "198.51.100.7".to_string()),
                ("port".to_string(), "33445".to_string()),
                ("public_key".to_string(), hex::encode([0x42u8; 32])),
            ]),
            outputs: BTreeMap::from([("encoded".to_string(), hex::encode(&encoded))]),
        },
    );

    vectors
}

fn generate_dht_packet_vectors() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    let target_pk = [0x07u8; 32];
    let ping_id = 0xDEAD_BEEF_0000_0001u64;
    let encoded = duskwire_dht::packets::encode_nodes_request(&target_pk, ping_id);
    vectors.insert(
        "nodes_request_body".to_string(),
        TestVector {
            description: "nodes request plaintext body: {target_pk:32, ping_id:8}".to_string(),
            inputs: BTreeMap::from([
                ("target_pk".to_string(), hex::encode(target_pk)),
                ("ping_id".to_string(), ping_id.to_string()),
            ]),
            outputs: BTreeMap::from([("encoded".to_string(), hex::encode(&encoded))]),
        },
    );

    vectors
}

fn generate_cookie_vector() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    let secret = duskwire_netcrypto::cookie::CookieSecretKey::from_bytes([0x5Au8; 32]);
    let real_pk = [0x01u8; 32];
    let dht_pk = [0x02u8; 32];
    let now_secs = 1_700_000_000u64;
    let cookie = secret.mint(&real_pk, &dht_pk, now_secs);

    vectors.insert(
        "cookie_mint".to_string(),
        TestVector {
            description:
                "Cookie mint: HMAC-authenticated {real_pk:32, dht_pk:32, timestamp:8, hmac:32}"
                    .to_string(),
            inputs: BTreeMap::from([
                ("secret_key".to_string(), hex::encode([0x5Au8; 32])),
                ("real_pk".to_string(), hex::encode(real_pk)),
                ("dht_pk".to_string(), hex::encode(dht_pk)),
                ("now_secs".to_string(), now_secs.to_string()),
            ]),
            outputs: BTreeMap::from([("cookie".to_string(), hex::encode(cookie))]),
        },
    );

    vectors
}

fn generate_nonce_vector() -> BTreeMap<String, TestVector> {
    let mut vectors = BTreeMap::new();

    let base_nonce = [0u8; 24];
    let counter = 65_537u64;
    let nonce = duskwire_netcrypto::session_nonce::nonce_for_counter(&base_nonce, counter);

    vectors.insert(
        "nonce_for_counter".to_string(),
        TestVector {
            description: "Per-packet nonce = base_nonce + counter (big-endian addition)"
                .to_string(),
            inputs: BTreeMap::from([
                ("base_nonce".to_string(), hex::encode(base_nonce)),
                ("counter".to_string(), counter.to_string()),
            ]),
            outputs: BTreeMap::from([("nonce".to_string(), hex::encode(nonce))]),
        },
    );

    vectors
}

fn generate_all_vectors() -> TestVectors {
    let mut all_vectors = BTreeMap::new();

    all_vectors.extend(generate_blake3_vectors());
    all_vectors.extend(generate_hmac_vectors());
    all_vectors.extend(generate_addr_vectors());
    all_vectors.extend(generate_dht_packet_vectors());
    all_vectors.extend(generate_cookie_vector());
    all_vectors.extend(generate_nonce_vector());

    TestVectors {
        version: "1.0".to_string(),
        generated_by: "duskwire-testvec".to_string(),
        vectors: all_vectors,
    }
}

fn verify_vectors(vectors: &TestVectors) -> bool {
    let regenerated = generate_all_vectors();
    let mut all_pass = true;

    for (name, expected) in &vectors.vectors {
        match regenerated.vectors.get(name) {
            Some(actual) if actual.outputs == expected.outputs => {
                eprintln!("PASS: {name}");
            }
            Some(actual) => {
                eprintln!("FAIL: {name}");
                eprintln!("  expected: {:?}", expected.outputs);
                eprintln!("  actual:   {:?}", actual.outputs);
                all_pass = false;
            }
            None => {
                eprintln!("MISSING: {name}");
                all_pass = false;
            }
        }
    }

    all_pass
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let path = "tests/fixtures/test_vectors.json";

    if args.iter().any(|a| a == "--verify") {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let vectors: TestVectors =
                    serde_json::from_str(&content).expect("existing test vectors file is valid JSON");
                if verify_vectors(&vectors) {
                    eprintln!("All test vectors verified successfully.");
                } else {
                    eprintln!("Test vector verification FAILED.");
                    std::process::exit(1);
                }
            }
            Err(_) => {
                eprintln!("No existing test vectors found at {path}.");
                std::process::exit(1);
            }
        }
        return;
    }

    let vectors = generate_all_vectors();
    let json = serde_json::to_string_pretty(&vectors).expect("serialize test vectors");

    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent).expect("create fixtures directory");
    }
    std::fs::write(path, &json).expect("write test vectors file");
    eprintln!("Generated {} test vectors to {path}", vectors.vectors.len());

    if !verify_vectors(&vectors) {
        eprintln!("Self-verification FAILED.");
        std::process::exit(1);
    }
    eprintln!("Self-verification passed.");
}
