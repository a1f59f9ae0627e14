pub mod health;
pub use self::health::health;

pub(crate) mod auth;
pub(crate) mod locale;
