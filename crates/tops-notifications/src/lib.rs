//! SMTP delivery for operator notifications.

mod email;

pub use email::SmtpEmailService;
