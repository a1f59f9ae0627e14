//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary will execute.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::oauth;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let secret = matches
        .get_one::<String>("secret")
        .cloned()
        .context("missing required argument: --secret")?;
    let frontend_url = matches
        .get_one::<String>("frontend-url")
        .cloned()
        .context("missing required argument: --frontend-url")?;
    let public_url = matches
        .get_one::<String>("public-url")
        .cloned()
        .unwrap_or_else(|| frontend_url.clone());
    let session_ttl_seconds = matches
        .get_one::<u64>("session-ttl-seconds")
        .copied()
        .unwrap_or(2_592_000);
    let issuer = matches
        .get_one::<String>("issuer")
        .cloned()
        .unwrap_or_else(|| "hejmo".to_string());

    let oauth_opts = oauth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        secret: SecretString::from(secret),
        frontend_url,
        public_url,
        session_ttl_seconds,
        issuer,
        google: oauth_opts.google,
        microsoft: oauth_opts.microsoft,
    }))
}
