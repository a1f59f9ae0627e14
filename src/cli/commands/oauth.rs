//! OAuth provider credentials. A provider is enabled when both its client id
//! and client secret are present; configuring only one is an error.

use anyhow::{Result, anyhow};
use clap::{Arg, Command};
use secrecy::SecretString;

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_MICROSOFT_CLIENT_ID: &str = "microsoft-client-id";
pub const ARG_MICROSOFT_CLIENT_SECRET: &str = "microsoft-client-secret";

#[derive(Debug)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Default)]
pub struct Options {
    pub google: Option<ProviderCredentials>,
    pub microsoft: Option<ProviderCredentials>,
}

impl Options {
    /// Collect provider credentials from the matches.
    ///
    /// # Errors
    /// Returns an error if a provider has a client id without a secret or
    /// vice versa.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        Ok(Self {
            google: pair(matches, ARG_GOOGLE_CLIENT_ID, ARG_GOOGLE_CLIENT_SECRET)?,
            microsoft: pair(
                matches,
                ARG_MICROSOFT_CLIENT_ID,
                ARG_MICROSOFT_CLIENT_SECRET,
            )?,
        })
    }
}

fn pair(
    matches: &clap::ArgMatches,
    id_arg: &str,
    secret_arg: &str,
) -> Result<Option<ProviderCredentials>> {
    let client_id = matches.get_one::<String>(id_arg).cloned();
    let client_secret = matches.get_one::<String>(secret_arg).cloned();
    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(Some(ProviderCredentials {
            client_id,
            client_secret: SecretString::from(client_secret),
        })),
        (None, None) => Ok(None),
        _ => Err(anyhow!(
            "--{id_arg} and --{secret_arg} must be set together"
        )),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("HEJMO_GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("HEJMO_GOOGLE_CLIENT_SECRET"),
        )
        .arg(
            Arg::new(ARG_MICROSOFT_CLIENT_ID)
                .long(ARG_MICROSOFT_CLIENT_ID)
                .help("Microsoft OAuth client id")
                .env("HEJMO_MICROSOFT_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_MICROSOFT_CLIENT_SECRET)
                .long(ARG_MICROSOFT_CLIENT_SECRET)
                .help("Microsoft OAuth client secret")
                .env("HEJMO_MICROSOFT_CLIENT_SECRET"),
        )
}
