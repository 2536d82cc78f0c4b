//! HTTP JSON-RPC Server
//!
//! Provides HTTP endpoint for JSON-RPC methods. Params are positional, with
//! an optional trailing config object such as `{"ledger": "ephemeral"}`.

use crate::methods::{
    handle_get_account_info, handle_get_commit_signature, handle_get_commitment,
    handle_get_delegation_record, handle_get_health, handle_get_identity,
    handle_get_latest_blockhash, handle_get_signature_status, handle_get_slot,
    handle_send_transaction, GetAccountInfoRequest, GetCommitmentRequest, RpcContext, RpcError,
    SendTransactionRequest,
};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use delegation_types::LedgerKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::{str::FromStr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// HTTP RPC Server
pub struct HttpRpcServer {
    context: Arc<RpcContext>,
}

impl HttpRpcServer {
    /// Create a new HTTP RPC server
    pub fn new(context: Arc<RpcContext>) -> Self {
        Self { context }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

        Router::new()
            .route("/", post(handle_rpc))
            .layer(cors)
            .with_state(self.context)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP RPC server listening on {}", addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Handle JSON-RPC request
async fn handle_rpc(
    State(context): State<Arc<RpcContext>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let result = dispatch_method(&context, &request.method, request.params);

    let response = match result {
        Ok(value) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: Some(value),
            error: None,
        },
        Err(e) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id: request.id,
            result: None,
            error: Some(JsonRpcError {
                code: error_code(&e),
                message: e.to_string(),
                data: e.protocol_code().map(|code| json!({ "code": code })),
            }),
        },
    };

    (StatusCode::OK, Json(response))
}

/// Positional string param
fn str_param<'a>(params: &'a [Value], index: usize, name: &str) -> Result<&'a str, RpcError> {
    params
        .get(index)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::InvalidParams(format!("Missing {}", name)))
}

fn parse_param<T: FromStr>(params: &[Value], index: usize, name: &str) -> Result<T, RpcError> {
    str_param(params, index, name)?
        .parse()
        .map_err(|_| RpcError::InvalidParams(format!("Invalid {}", name)))
}

/// Field of the config object found at any position
fn config_field<'a>(params: &'a [Value], field: &str) -> Option<&'a Value> {
    params
        .iter()
        .filter(|v| v.is_object())
        .find_map(|v| v.get(field))
}

fn ledger_param(params: &[Value]) -> Result<LedgerKind, RpcError> {
    match config_field(params, "ledger").and_then(|v| v.as_str()) {
        Some(ledger) => ledger.parse().map_err(RpcError::InvalidParams),
        None => Ok(LedgerKind::Base),
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::InternalError(e.to_string()))
}

/// Dispatch to appropriate method handler
pub(crate) fn dispatch_method(
    ctx: &RpcContext,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    tracing::debug!("RPC method called: {}", method);
    let params: Vec<Value> = serde_json::from_value(params).unwrap_or_default();

    match method {
        "sendTransaction" => {
            let request = SendTransactionRequest {
                transaction: str_param(&params, 0, "transaction")?.to_string(),
                ledger: ledger_param(&params)?,
            };
            let sig = handle_send_transaction(ctx, request)?;
            Ok(json!(sig))
        }

        "getAccountInfo" => {
            let request = GetAccountInfoRequest {
                pubkey: parse_param(&params, 0, "pubkey")?,
                ledger: ledger_param(&params)?,
                encoding: config_field(&params, "encoding")
                    .and_then(|v| v.as_str())
                    .map(String::from),
            };
            to_json(handle_get_account_info(ctx, request)?)
        }

        "getDelegationRecord" => {
            let account: Pubkey = parse_param(&params, 0, "pubkey")?;
            to_json(handle_get_delegation_record(ctx, &account)?)
        }

        "getCommitment" => {
            let seq = params
                .get(1)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| RpcError::InvalidParams("Missing seq".to_string()))?;
            let delegation_id = match config_field(&params, "delegationId").and_then(|v| v.as_str()) {
                Some(id) => Some(
                    id.parse()
                        .map_err(|_| RpcError::InvalidParams("Invalid delegationId".to_string()))?,
                ),
                None => None,
            };
            let request = GetCommitmentRequest {
                account: parse_param(&params, 0, "pubkey")?,
                seq,
                delegation_id,
            };
            to_json(handle_get_commitment(ctx, request)?)
        }

        "getSignatureStatus" => {
            let signature: Signature = parse_param(&params, 0, "signature")?;
            to_json(handle_get_signature_status(ctx, &signature, ledger_param(&params)?)?)
        }

        "getCommitSignature" => {
            let request: Signature = parse_param(&params, 0, "signature")?;
            to_json(handle_get_commit_signature(ctx, &request)?)
        }

        "getLatestBlockhash" => to_json(handle_get_latest_blockhash(ctx, ledger_param(&params)?)?),

        "getSlot" => {
            let slot = handle_get_slot(ctx, ledger_param(&params)?)?;
            Ok(json!(slot))
        }

        "getIdentity" => {
            let identity = handle_get_identity(ctx)?;
            Ok(json!({ "identity": identity }))
        }

        "getHealth" => {
            let health = handle_get_health()?;
            Ok(json!(health))
        }

        "getVersion" => Ok(json!({
            "solana-core": "2.1.0",
            "eel-version": env!("CARGO_PKG_VERSION"),
        })),

        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}

/// Map error to JSON-RPC error code
fn error_code(error: &RpcError) -> i32 {
    match error {
        RpcError::InvalidParams(_) => -32602,
        RpcError::MethodNotFound(_) => -32601,
        RpcError::InternalError(_) => -32603,
        RpcError::TransactionRejected(_) => -32002,
        RpcError::Commit(_) => -32004,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use counter_program::{counter_address, instruction};
    use delegation_bridge::{CommitterConfig, DelegationClient, PollConfig, StateCommitter};
    use delegation_types::{EphemeralInstruction, SignedTransaction};
    use ledger_runtime::{
        builtin_programs, BaseLedger, BaseLedgerConfig, EphemeralLedger, Ledger, SlotClock,
    };
    use solana_sdk::{signature::Keypair, signer::Signer};

    struct Node {
        ctx: RpcContext,
        committer: Arc<StateCommitter>,
    }

    fn node() -> Node {
        let validator = Arc::new(Keypair::new());
        let base = Arc::new(BaseLedger::new(builtin_programs(), BaseLedgerConfig::default()));
        let eel = Arc::new(EphemeralLedger::new(
            validator.pubkey(),
            base.clone(),
            builtin_programs(),
        ));
        let committer = Arc::new(StateCommitter::new(
            validator,
            base.clone(),
            eel.clone(),
            CommitterConfig::default(),
        ));
        let client = Arc::new(DelegationClient::new(
            base.clone(),
            eel.clone(),
            committer.clone(),
            PollConfig::default(),
        ));
        Node {
            ctx: RpcContext { base, eel, client },
            committer,
        }
    }

    fn call(node: &Node, method: &str, params: Value) -> Result<Value, RpcError> {
        dispatch_method(&node.ctx, method, params)
    }

    fn counter_with_delegation(node: &Node, controller: &Keypair) -> Pubkey {
        let counter = counter_address(&controller.pubkey());
        node.ctx
            .base
            .apply_write(controller, instruction::initialize(counter))
            .unwrap();
        node.ctx.client.delegate(&counter, controller).unwrap();
        counter
    }

    #[test]
    fn test_send_transaction_to_selected_ledger() {
        let node = node();
        let controller = Keypair::new();
        let counter = counter_with_delegation(&node, &controller);

        let tx = SignedTransaction::new(
            &controller,
            vec![EphemeralInstruction::Invoke(instruction::increment(counter))],
            node.ctx.eel.latest_blockhash(),
        );
        let encoded = BASE64.encode(tx.to_bytes());

        let sig = call(&node, "sendTransaction", json!([encoded.clone(), { "ledger": "ephemeral" }])).unwrap();
        assert_eq!(sig, json!(tx.signature().to_string()));

        // The ephemeral blockhash is unknown to the base ledger
        assert!(call(&node, "sendTransaction", json!([encoded])).is_err());

        let info = call(
            &node,
            "getAccountInfo",
            json!([counter.to_string(), { "ledger": "ephemeral" }]),
        )
        .unwrap();
        let data = BASE64
            .decode(info["value"]["data"][0].as_str().unwrap())
            .unwrap();
        assert_eq!(counter_program::Counter::from_bytes(&data).unwrap().count, 1);
        assert_eq!(info["value"]["delegated"], json!(true));
    }

    #[test]
    fn test_rejected_transaction_carries_protocol_code() {
        let node = node();
        let controller = Keypair::new();
        let counter = counter_with_delegation(&node, &controller);

        let tx = SignedTransaction::new(
            &controller,
            vec![delegation_types::BaseInstruction::Invoke(instruction::increment(counter))],
            node.ctx.base.latest_blockhash(),
        );
        let err = call(
            &node,
            "sendTransaction",
            json!([BASE64.encode(tx.to_bytes()), { "ledger": "base" }]),
        )
        .unwrap_err();
        assert_eq!(error_code(&err), -32002);
        assert_eq!(
            err.protocol_code(),
            Some(delegation_types::ProtocolError::UnauthorizedWriter.code())
        );
    }

    #[test]
    fn test_delegation_and_commit_queries() {
        let node = node();
        let controller = Keypair::new();
        let counter = counter_with_delegation(&node, &controller);

        let record = call(&node, "getDelegationRecord", json!([counter.to_string()])).unwrap();
        assert_eq!(record["delegatedTo"], json!(node.ctx.eel.identity().to_string()));
        assert_eq!(record["lastCommitSeq"], json!(0));

        let request = node
            .ctx
            .client
            .write_and_commit(&controller, instruction::increment(counter))
            .unwrap();
        let pending = call(&node, "getCommitSignature", json!([request.to_string()])).unwrap();
        assert_eq!(pending, Value::Null);

        node.committer.drain();
        node.ctx.base.advance_slot();
        node.ctx.base.advance_slot();

        let confirmed = call(&node, "getCommitSignature", json!([request.to_string()])).unwrap();
        assert_eq!(confirmed["commits"].as_array().unwrap().len(), 1);
        assert_eq!(confirmed["commits"][0]["account"], json!(counter.to_string()));
        assert_eq!(confirmed["commits"][0]["seq"], json!(1));
        let base_signature = confirmed["commits"][0]["baseSignature"]
            .as_str()
            .unwrap()
            .to_string();

        let commitment = call(&node, "getCommitment", json!([counter.to_string(), 1])).unwrap();
        assert_eq!(commitment["signature"], json!(base_signature));
        assert_eq!(commitment["identity"], json!(node.ctx.eel.identity().to_string()));
        let missing = call(&node, "getCommitment", json!([counter.to_string(), 2])).unwrap();
        assert_eq!(missing, Value::Null);

        let status = call(&node, "getSignatureStatus", json!([base_signature])).unwrap();
        assert_eq!(status["confirmation"], json!("finalized"));
    }

    #[test]
    fn test_unknown_commit_request() {
        let node = node();
        let err = call(
            &node,
            "getCommitSignature",
            json!([Signature::default().to_string()]),
        )
        .unwrap_err();
        assert_eq!(error_code(&err), -32004);
        assert!(err.protocol_code().is_none());
    }

    #[test]
    fn test_clock_and_node_methods() {
        let node = node();
        node.ctx.base.advance_slot();

        assert_eq!(call(&node, "getSlot", Value::Null).unwrap(), json!(1));
        assert_eq!(
            call(&node, "getSlot", json!([{ "ledger": "ephemeral" }])).unwrap(),
            json!(0)
        );

        let blockhash = call(&node, "getLatestBlockhash", json!([{ "ledger": "eel" }])).unwrap();
        assert_eq!(
            blockhash["value"]["blockhash"],
            json!(node.ctx.eel.latest_blockhash().to_string())
        );

        let identity = call(&node, "getIdentity", Value::Null).unwrap();
        assert_eq!(identity["identity"], json!(node.ctx.eel.identity().to_string()));
        assert_eq!(call(&node, "getHealth", Value::Null).unwrap(), json!("ok"));

        assert!(matches!(
            call(&node, "getSlot", json!([{ "ledger": "moon" }])),
            Err(RpcError::InvalidParams(_))
        ));
        assert!(matches!(
            call(&node, "getBlock", Value::Null),
            Err(RpcError::MethodNotFound(_))
        ));
    }
}
