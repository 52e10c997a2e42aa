// API module
//
// HTTP request layer over the ledger. Handlers translate ledger failures into
// JSON error responses and own no chain invariants themselves.

pub mod doc;
pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use doc::ApiDoc;
pub use routes::configure_routes;
