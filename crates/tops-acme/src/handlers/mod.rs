pub(crate) mod acme_handler;
pub(crate) mod types;

pub use acme_handler::{configure_routes, AcmeApiDoc, Operator, USER_HEADER};
pub use types::{create_acme_app_state, AcmeAppState, AcmeDependencies};
