//! Relay header-signature law: the `address:signature` header recovers back
//! to the signing address over EIP-191(text(keccak_hex(body))) for any body.

use alloy::primitives::{eip191_hash_message, keccak256, Signature};
use alloy::signers::local::PrivateKeySigner;
use bundle_rescue::relay::transport::RelayTransport;

fn recover(header: &str, body: &[u8]) -> (String, alloy::primitives::Address) {
    let (addr, sig_hex) = header.split_once(':').expect("header has address:sig");
    let digest = eip191_hash_message(keccak256(body).to_string().as_bytes());
    let sig_bytes = hex::decode(sig_hex.trim_start_matches("0x")).unwrap();
    let signature = Signature::try_from(sig_bytes.as_slice()).unwrap();
    (
        addr.to_string(),
        signature.recover_address_from_prehash(&digest).unwrap(),
    )
}

#[test]
fn header_signature_recovers_for_various_bodies() {
    let signer: PrivateKeySigner =
        "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap();
    let expected = signer.address();
    let transport = RelayTransport::new(Some(signer));

    let bodies: Vec<Vec<u8>> = vec![
        br#"{"jsonrpc":"2.0","id":1,"method":"eth_sendBundle","params":[{"txs":[],"blockNumber":"0x0"}]}"#.to_vec(),
        br#"{"jsonrpc":"2.0","id":1,"method":"mev_simBundle","params":[]}"#.to_vec(),
        b"{}".to_vec(),
        vec![0u8; 512],
    ];

    for body in bodies {
        let header = transport.body_signature(&body).unwrap();
        let (addr_part, recovered) = recover(&header, &body);
        assert_eq!(addr_part, expected.to_string());
        assert_eq!(recovered, expected);
    }
}

#[test]
fn header_signature_differs_per_body() {
    let signer: PrivateKeySigner =
        "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318"
            .parse()
            .unwrap();
    let transport = RelayTransport::new(Some(signer));

    let a = transport.body_signature(b"body-a").unwrap();
    let b = transport.body_signature(b"body-b").unwrap();
    assert_ne!(a, b);
}
