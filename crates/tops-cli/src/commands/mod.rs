pub mod autorenew;
pub mod openapi;
pub mod serve;
mod services;

pub use autorenew::AutoRenewCommand;
pub use openapi::OpenApiCommand;
pub use serve::ServeCommand;
