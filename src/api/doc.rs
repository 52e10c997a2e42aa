use utoipa::OpenApi;

use super::handlers;
use crate::blockchain;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_chain,
        handlers::validate_chain,
        handlers::get_pending_transactions,
        handlers::send_transaction,
        handlers::mine,
        handlers::mine_for,
        handlers::create_wallet,
        handlers::get_balance
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Address,
            blockchain::DigitalSignature,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::ChainResponse,
            handlers::ValidateResponse,
            handlers::WalletResponse,
            handlers::BalanceResponse,
            handlers::TransactionRequest,
            handlers::TransactionResponse,
            handlers::MineRequest,
            handlers::MineResponse
        )
    ),
    tags(
        (name = "ledger", description = "Ledger API endpoints")
    ),
    info(
        title = "Pana Ledger API",
        version = "0.1.0",
        description = "Signed transfers sealed into proof-of-work blocks",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
