//! HTTP clients for the supported OAuth providers.
//!
//! Both providers speak the authorization-code flow: redirect out with a
//! sealed `state`, exchange the returned code for an access token, then fetch
//! the profile and normalize it into an [`ExternalIdentity`]. Response parsing
//! is kept in pure functions so the field mapping is testable without a
//! network.

use anyhow::{Context, Result, anyhow};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use url::Url;

use super::ExternalIdentity;
use crate::store::OAuthProvider;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const MICROSOFT_AUTH_URL: &str =
    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MICROSOFT_PROFILE_URL: &str = "https://graph.microsoft.com/v1.0/me";

/// Registered application credentials for one provider.
#[derive(Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
}

/// Outbound client for provider redirects, code exchange, and profile fetch.
#[derive(Clone)]
pub struct ProviderClient {
    http: reqwest::Client,
    google: Option<OAuthClientConfig>,
    microsoft: Option<OAuthClientConfig>,
}

impl ProviderClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        google: Option<OAuthClientConfig>,
        microsoft: Option<OAuthClientConfig>,
    ) -> Self {
        Self {
            http,
            google,
            microsoft,
        }
    }

    fn config(&self, provider: OAuthProvider) -> Result<&OAuthClientConfig> {
        match provider {
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::Microsoft => self.microsoft.as_ref(),
        }
        .ok_or_else(|| anyhow!("provider {} is not configured", provider.as_str()))
    }

    /// Build the provider authorization URL carrying the sealed CSRF state.
    ///
    /// # Errors
    /// Returns an error if the provider is not configured.
    pub fn authorize_url(&self, provider: OAuthProvider, state: &str) -> Result<String> {
        let config = self.config(provider)?;
        let (base, scope) = match provider {
            OAuthProvider::Google => (GOOGLE_AUTH_URL, "openid email profile"),
            OAuthProvider::Microsoft => (MICROSOFT_AUTH_URL, "openid email profile User.Read"),
        };

        let mut url = Url::parse(base).context("invalid provider authorization URL")?;
        url.query_pairs_mut()
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", scope)
            .append_pair("state", state);
        Ok(url.into())
    }

    /// Exchange an authorization code, fetch the profile, and normalize it.
    ///
    /// # Errors
    /// Returns an error on transport failures, provider error responses, or a
    /// profile missing its required fields.
    pub async fn exchange_code(
        &self,
        provider: OAuthProvider,
        code: &str,
    ) -> Result<ExternalIdentity> {
        let config = self.config(provider)?;
        let token_url = match provider {
            OAuthProvider::Google => GOOGLE_TOKEN_URL,
            OAuthProvider::Microsoft => MICROSOFT_TOKEN_URL,
        };

        let response = self
            .http
            .post(token_url)
            .form(&[
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.expose_secret()),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
            ])
            .send()
            .await
            .context("token exchange request failed")?
            .error_for_status()
            .context("provider rejected the token exchange")?;

        let body: Value = response
            .json()
            .await
            .context("token response is not valid JSON")?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("token response has no access_token"))?;

        let profile = self.fetch_profile(provider, access_token).await?;
        match provider {
            OAuthProvider::Google => parse_google(&profile),
            OAuthProvider::Microsoft => parse_microsoft(&profile),
        }
    }

    async fn fetch_profile(&self, provider: OAuthProvider, access_token: &str) -> Result<Value> {
        let profile_url = match provider {
            OAuthProvider::Google => GOOGLE_USERINFO_URL,
            OAuthProvider::Microsoft => MICROSOFT_PROFILE_URL,
        };
        self.http
            .get(profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("profile request failed")?
            .error_for_status()
            .context("provider rejected the profile request")?
            .json()
            .await
            .context("profile response is not valid JSON")
    }
}

/// Map a Google OpenID userinfo document to an identity assertion.
fn parse_google(profile: &Value) -> Result<ExternalIdentity> {
    let provider_account_id = profile
        .get("sub")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("google profile has no sub"))?
        .to_string();
    let email = profile
        .get("email")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("google profile has no email"))?
        .to_string();

    Ok(ExternalIdentity {
        provider: OAuthProvider::Google,
        provider_account_id,
        email,
        email_verified: profile
            .get("email_verified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        display_name: profile
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Map a Microsoft Graph `/me` document to an identity assertion.
///
/// Graph exposes no explicit verification flag; a populated `mail` field is
/// provisioned by the tenant and treated as verified, while a fallback to
/// `userPrincipalName` is not.
fn parse_microsoft(profile: &Value) -> Result<ExternalIdentity> {
    let provider_account_id = profile
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("microsoft profile has no id"))?
        .to_string();

    let mail = profile.get("mail").and_then(Value::as_str);
    let email = mail
        .or_else(|| profile.get("userPrincipalName").and_then(Value::as_str))
        .ok_or_else(|| anyhow!("microsoft profile has no usable email"))?
        .to_string();

    Ok(ExternalIdentity {
        provider: OAuthProvider::Microsoft,
        provider_account_id,
        email,
        email_verified: mail.is_some(),
        display_name: profile
            .get("displayName")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> ProviderClient {
        ProviderClient::new(
            reqwest::Client::new(),
            Some(OAuthClientConfig {
                client_id: "google-client".to_string(),
                client_secret: SecretString::from("google-secret"),
                redirect_uri: "https://hejmo.dev/v1/auth/oauth/google/callback".to_string(),
            }),
            None,
        )
    }

    #[test]
    fn authorize_url_carries_state_and_client() {
        let url = client()
            .authorize_url(OAuthProvider::Google, "opaque-state")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("state".to_string(), "opaque-state".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "google-client".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
    }

    #[test]
    fn unconfigured_provider_is_an_error() {
        let result = client().authorize_url(OAuthProvider::Microsoft, "s");
        assert!(result.is_err());
    }

    #[test]
    fn google_profile_maps_all_fields() {
        let identity = parse_google(&json!({
            "sub": "g-1",
            "email": "a@x.com",
            "email_verified": true,
            "name": "A. Person",
        }))
        .unwrap();
        assert_eq!(identity.provider_account_id, "g-1");
        assert_eq!(identity.email, "a@x.com");
        assert!(identity.email_verified);
        assert_eq!(identity.display_name.as_deref(), Some("A. Person"));
    }

    #[test]
    fn google_missing_verification_flag_means_unverified() {
        let identity = parse_google(&json!({ "sub": "g-1", "email": "a@x.com" })).unwrap();
        assert!(!identity.email_verified);
    }

    #[test]
    fn google_profile_without_email_fails() {
        assert!(parse_google(&json!({ "sub": "g-1" })).is_err());
    }

    #[test]
    fn microsoft_mail_field_counts_as_verified() {
        let identity = parse_microsoft(&json!({
            "id": "m-1",
            "mail": "a@x.com",
            "displayName": "A. Person",
        }))
        .unwrap();
        assert_eq!(identity.provider_account_id, "m-1");
        assert!(identity.email_verified);
    }

    #[test]
    fn microsoft_upn_fallback_is_unverified() {
        let identity = parse_microsoft(&json!({
            "id": "m-1",
            "mail": null,
            "userPrincipalName": "a@x.com",
        }))
        .unwrap();
        assert_eq!(identity.email, "a@x.com");
        assert!(!identity.email_verified);
    }
}
