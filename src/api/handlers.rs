use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Address, Block, KeyCustody, Ledger, LedgerError, Transaction};

/// Shared ledger handle
pub type LedgerData = web::Data<Ledger>;

/// Shared key custody handle
pub type CustodyData = web::Data<KeyCustody>;

/// Error body returned for every rejected request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: message.into(),
    })
}

fn ledger_error_response(err: &LedgerError) -> HttpResponse {
    let status = match err {
        LedgerError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    error_response(status, err.to_string())
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "API is running".to_string(),
    })
}

/// Response for the chain endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainResponse {
    /// The length of the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,
}

/// Get the full chain
#[utoipa::path(
    get,
    path = "/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(ledger: LedgerData) -> impl Responder {
    let chain = ledger.chain();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
    })
}

/// Get all pending transactions
#[utoipa::path(
    get,
    path = "/transactions/pending",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_pending_transactions(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ledger.pending_transactions())
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
}

/// Check chain integrity
#[utoipa::path(
    get,
    path = "/validate",
    responses(
        (status = 200, description = "Chain validation status", body = ValidateResponse)
    )
)]
pub async fn validate_chain(ledger: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(ValidateResponse {
        valid: ledger.is_chain_valid(),
    })
}

/// Response for the create wallet endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    /// The wallet's address
    pub address: String,

    /// The wallet's private key (hex encoded)
    pub private_key: String,
}

/// Create a new wallet
///
/// The private key is returned once and never stored by the node.
#[utoipa::path(
    post,
    path = "/wallet/create",
    responses(
        (status = 200, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet(custody: CustodyData) -> impl Responder {
    let wallet = custody.generate_wallet();

    HttpResponse::Ok().json(WalletResponse {
        address: wallet.address().to_string(),
        private_key: hex::encode(wallet.export_secret_key()),
    })
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

/// Get the balance of an address
#[utoipa::path(
    get,
    path = "/wallet/balance/{address}",
    params(
        ("address" = String, Path, description = "Address to sum")
    ),
    responses(
        (status = 200, description = "Balance computed from the chain", body = BalanceResponse)
    )
)]
pub async fn get_balance(ledger: LedgerData, address: web::Path<String>) -> impl Responder {
    let address = Address(address.into_inner());
    let balance = ledger.get_balance(&address);

    HttpResponse::Ok().json(BalanceResponse {
        address: address.0,
        balance,
    })
}

/// Request for the send endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: Option<f64>,

    /// The sender's private key (hex), used to sign and then dropped
    pub private_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub message: String,

    /// Index of the block the transaction is queued for
    pub block_index: u64,
}

/// Sign and submit a transfer
#[utoipa::path(
    post,
    path = "/transaction/send",
    request_body = TransactionRequest,
    responses(
        (status = 200, description = "Transaction queued", body = TransactionResponse),
        (status = 400, description = "Rejected transaction", body = ErrorResponse)
    )
)]
pub async fn send_transaction(
    ledger: LedgerData,
    custody: CustodyData,
    request: web::Json<TransactionRequest>,
) -> impl Responder {
    let request = request.into_inner();
    let (from_address, to_address, amount, private_key) = match (
        request.from_address,
        request.to_address,
        request.amount,
        request.private_key,
    ) {
        (Some(from), Some(to), Some(amount), Some(key)) => (from, to, amount, key),
        _ => return error_response(StatusCode::BAD_REQUEST, "Missing transaction parameters"),
    };

    let wallet = match custody.wallet_from_secret_hex(&private_key) {
        Ok(wallet) => wallet,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, err.to_string()),
    };

    let mut transaction = Transaction::new(Address(from_address), Address(to_address), amount);
    if let Err(err) = transaction.sign(&wallet) {
        return error_response(StatusCode::BAD_REQUEST, err.to_string());
    }

    match ledger.add_transaction(transaction) {
        Ok(block_index) => HttpResponse::Ok().json(TransactionResponse {
            message: "Transaction added to pending transactions".to_string(),
            block_index,
        }),
        Err(err) => ledger_error_response(&err),
    }
}

/// Request for the mine endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MineRequest {
    pub miner_address: Option<String>,
}

/// Response for the mine endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MineResponse {
    pub message: String,

    /// The newly sealed block
    pub block: Block,

    /// The chain after sealing
    pub chain: Vec<Block>,
}

/// Seal pending transactions, miner address in the body
#[utoipa::path(
    post,
    path = "/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Missing miner address", body = ErrorResponse),
        (status = 500, description = "Block sealed but not persisted", body = ErrorResponse)
    )
)]
pub async fn mine(ledger: LedgerData, request: Option<web::Json<MineRequest>>) -> impl Responder {
    let miner_address = request.and_then(|r| r.into_inner().miner_address);
    seal(ledger, miner_address).await
}

/// Seal pending transactions, miner address in the path
#[utoipa::path(
    post,
    path = "/mine/{minerAddress}",
    params(
        ("minerAddress" = String, Path, description = "Address credited with the reward")
    ),
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 500, description = "Block sealed but not persisted", body = ErrorResponse)
    )
)]
pub async fn mine_for(ledger: LedgerData, miner_address: web::Path<String>) -> impl Responder {
    seal(ledger, Some(miner_address.into_inner())).await
}

async fn seal(ledger: LedgerData, miner_address: Option<String>) -> HttpResponse {
    let miner_address = Address(miner_address.unwrap_or_default());

    // Mining is CPU bound; keep it off the async workers.
    let sealer = ledger.clone();
    let result = web::block(move || sealer.seal_pending_transactions(&miner_address)).await;

    match result {
        Ok(Ok(block)) => {
            info!("Mined block {} via API", block.index);
            HttpResponse::Ok().json(MineResponse {
                message: "Block mined successfully".to_string(),
                block,
                chain: ledger.chain(),
            })
        }
        Ok(Err(err)) => ledger_error_response(&err),
        Err(err) => {
            error!("Mining task failed: {}", err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Mining task failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use crate::blockchain::LedgerConfig;
    use actix_web::{test, App};
    use serde_json::Value;

    fn state() -> (LedgerData, CustodyData) {
        let config = LedgerConfig {
            difficulty: 1,
            mining_reward: 100.0,
        };
        (
            web::Data::new(Ledger::in_memory(config).unwrap()),
            web::Data::new(KeyCustody::new()),
        )
    }

    #[actix_web::test]
    async fn test_health_and_chain() {
        let (ledger, custody) = state();
        let app = test::init_service(
            App::new()
                .app_data(ledger)
                .app_data(custody)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "API is running");

        let req = test::TestRequest::get().uri("/chain").to_request();
        let body: ChainResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.length, 1);
        assert_eq!(body.chain[0].index, 0);
    }

    #[actix_web::test]
    async fn test_send_mine_and_balance() {
        let (ledger, custody) = state();
        let app = test::init_service(
            App::new()
                .app_data(ledger.clone())
                .app_data(custody)
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post().uri("/wallet/create").to_request();
        let wallet: WalletResponse = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/transaction/send")
            .set_json(serde_json::json!({
                "fromAddress": wallet.address,
                "toAddress": "recipient",
                "amount": 25.0,
                "privateKey": wallet.private_key,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post().uri("/mine/miner").to_request();
        let body: MineResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.block.index, 1);
        assert_eq!(body.chain.len(), 2);

        let req = test::TestRequest::get()
            .uri("/wallet/balance/recipient")
            .to_request();
        let body: BalanceResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.balance, 25.0);

        let req = test::TestRequest::get().uri("/validate").to_request();
        let body: ValidateResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.valid);
        assert_eq!(ledger.get_balance(&Address("miner".to_string())), 100.0);
    }

    #[actix_web::test]
    async fn test_rejections() {
        let (ledger, custody) = state();
        let app = test::init_service(
            App::new()
                .app_data(ledger)
                .app_data(custody.clone())
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/transaction/send")
            .set_json(serde_json::json!({ "toAddress": "recipient", "amount": 1.0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let owner = custody.generate_wallet();
        let intruder = custody.generate_wallet();
        let req = test::TestRequest::post()
            .uri("/transaction/send")
            .set_json(serde_json::json!({
                "fromAddress": owner.address().to_string(),
                "toAddress": "recipient",
                "amount": 1.0,
                "privateKey": hex::encode(intruder.export_secret_key()),
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.error.contains("Unauthorized signer"));

        let req = test::TestRequest::post()
            .uri("/mine")
            .set_json(serde_json::json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "Miner address is required");
    }
}
