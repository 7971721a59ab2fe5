mod claim_session;
mod plan;
mod tenant;
mod voucher;

pub use claim_session::*;
pub use plan::*;
pub use tenant::*;
pub use voucher::*;
