//! Outbound email collaborator.
//!
//! Delivery is external; the service only hands messages to an injected
//! [`EmailSender`]. Notification sends are fire-and-forget: a delivery
//! failure is logged and never fails the auth flow that triggered it.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::store::OAuthProvider;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the failure can be logged.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email send stub"
        );
        Ok(())
    }
}

/// Deliver a message off the request path; failures are logged only.
pub fn send_detached(sender: Arc<dyn EmailSender>, message: EmailMessage) {
    tokio::spawn(async move {
        if let Err(err) = sender.send(&message) {
            error!(template = %message.template, "failed to send email: {err}");
        }
    });
}

pub fn verify_email_message(to_email: &str, verify_url: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        template: "verify_email".to_string(),
        payload_json: json!({ "verify_url": verify_url }).to_string(),
    }
}

pub fn password_reset_message(to_email: &str, reset_url: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        template: "reset_password".to_string(),
        payload_json: json!({ "reset_url": reset_url }).to_string(),
    }
}

pub fn email_change_message(to_email: &str, confirm_url: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        template: "change_email".to_string(),
        payload_json: json!({ "confirm_url": confirm_url }).to_string(),
    }
}

/// Heads-up sent when an external identity gets linked to an account.
pub fn oauth_linked_message(to_email: &str, provider: OAuthProvider) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        template: "oauth_account_linked".to_string(),
        payload_json: json!({ "provider": provider.as_str() }).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sender_accepts_messages() {
        let sender = LogEmailSender;
        let message = verify_email_message("a@x.com", "https://hejmo.dev/verify-email#token=t");
        assert!(sender.send(&message).is_ok());
        assert_eq!(message.template, "verify_email");
    }

    #[test]
    fn linked_message_names_the_provider() {
        let message = oauth_linked_message("a@x.com", OAuthProvider::Google);
        assert!(message.payload_json.contains("google"));
    }
}
