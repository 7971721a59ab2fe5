mod flutterwave;
mod paystack;

pub use flutterwave::*;
pub use paystack::*;

use axum::routing::post;
use axum::Router;

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/paystack", post(paystack_webhook))
        .route("/webhook/flutterwave", post(flutterwave_webhook))
}
