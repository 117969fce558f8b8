//! Business logic services.

pub mod auth;
pub mod captcha;
pub mod cart;
pub mod email;
pub mod session;
pub mod tokens;

pub use auth::{AuthError, AuthService};
pub use captcha::{CaptchaChallenge, CaptchaService};
pub use cart::{CartError, CartLockRegistry, CartService};
pub use email::{LogMailer, Mailer, MailerError, SmtpMailer};
pub use tokens::{TokenKind, TokenService};
