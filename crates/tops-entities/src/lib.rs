pub mod acme_account;
pub mod async_status;
pub mod cdn;
pub mod cdn_lock;
pub mod deliveryservice;
pub mod dnschallenges;
pub mod dnssec;
pub mod log;
pub mod sslkey;

pub mod prelude {
    pub use super::acme_account::Entity as AcmeAccount;
    pub use super::async_status::Entity as AsyncStatus;
    pub use super::cdn::Entity as Cdn;
    pub use super::cdn_lock::Entity as CdnLock;
    pub use super::deliveryservice::Entity as DeliveryService;
    pub use super::dnschallenges::Entity as DnsChallenges;
    pub use super::dnssec::Entity as Dnssec;
    pub use super::log::Entity as Log;
    pub use super::sslkey::Entity as SslKey;
}
