pub mod handlers;
pub mod routes;

use std::sync::Arc;

use crate::auth::AuthService;
use crate::billing::BillingProvider;
use crate::config::PaginationConfig;
use crate::storage::Storage;

pub use routes::create_api_router;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub auth: Arc<AuthService>,
    pub billing: Arc<dyn BillingProvider>,
    pub pagination: PaginationConfig,
}
