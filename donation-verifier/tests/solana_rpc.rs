//! Solana JSON-RPC client against a mock HTTP node.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use donation_verifier::solana::SYSTEM_PROGRAM_ID;
use donation_verifier::{SolanaChainAccess, SolanaCommitment, SolanaRpcClient, VerifyError};

fn signature() -> String {
    bs58::encode([3u8; 64]).into_string()
}

fn fast_client(server: &MockServer) -> SolanaRpcClient {
    SolanaRpcClient::new(&server.uri())
        .unwrap()
        .with_backoff(vec![Duration::from_millis(1); 3])
}

#[tokio::test]
async fn test_get_transaction_decodes_system_transfer() {
    let server = MockServer::start().await;
    let from = bs58::encode([1u8; 32]).into_string();
    let to = bs58::encode([7u8; 32]).into_string();

    let mut data = 2u32.to_le_bytes().to_vec();
    data.extend_from_slice(&1_000u64.to_le_bytes());

    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getTransaction" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "slot": 123,
                "meta": { "err": null },
                "transaction": {
                    "signatures": [signature()],
                    "message": {
                        "accountKeys": [from, to, SYSTEM_PROGRAM_ID],
                        "instructions": [{
                            "programIdIndex": 2,
                            "accounts": [0, 1],
                            "data": bs58::encode(&data).into_string()
                        }]
                    }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let tx = client.transaction(&signature()).await.unwrap().unwrap();

    assert_eq!(tx.slot, 123);
    assert!(!tx.failed);
    assert_eq!(tx.instructions.len(), 1);
    assert_eq!(tx.instructions[0].program_id, SYSTEM_PROGRAM_ID);
    assert_eq!(tx.instructions[0].accounts[1], to);
    assert_eq!(tx.instructions[0].data, data);
}

#[tokio::test]
async fn test_unknown_signature_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": null
        })))
        .mount(&server)
        .await;

    let client = fast_client(&server);
    assert!(client.transaction(&signature()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_signature_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getSignatureStatuses" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": { "slot": 200 },
                "value": [{
                    "slot": 123,
                    "confirmations": null,
                    "err": null,
                    "confirmationStatus": "finalized"
                }]
            }
        })))
        .mount(&server)
        .await;

    let client = fast_client(&server);
    assert_eq!(
        client.signature_status(&signature()).await.unwrap(),
        Some(SolanaCommitment::Finalized)
    );
}

#[tokio::test]
async fn test_invalid_params_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "Invalid param: WrongSize" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let result = client.transaction("abc").await;
    assert!(matches!(result, Err(VerifyError::MalformedReference(_))));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    println!("🧪 Testing retry on HTTP 503...");
    let client = fast_client(&server);
    let result = client.transaction(&signature()).await;

    assert!(matches!(result, Err(VerifyError::ChainUnavailable(_))));
    println!("✅ Pass: three attempts, then ChainUnavailable");
}
