use actix_web::web;

use super::handlers;

/// Configures the API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::health))
        .route("/chain", web::get().to(handlers::get_chain))
        .route("/validate", web::get().to(handlers::validate_chain))
        .route("/transactions/pending", web::get().to(handlers::get_pending_transactions))
        .route("/transaction/send", web::post().to(handlers::send_transaction))
        .route("/mine", web::post().to(handlers::mine))
        .route("/mine/{minerAddress}", web::post().to(handlers::mine_for))
        .route("/wallet/create", web::post().to(handlers::create_wallet))
        .route("/wallet/balance/{address}", web::get().to(handlers::get_balance));
}
