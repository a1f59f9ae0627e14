pub mod logging;
pub mod oauth;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::api::GIT_COMMIT_HASH)
            .into_boxed_str(),
    );

    let command = Command::new("hejmo")
        .about("Household management service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("HEJMO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("secret")
                .short('s')
                .long("secret")
                .help("Server secret; cookie sealing and secret encryption keys are derived from it")
                .env("HEJMO_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("frontend-url")
                .short('f')
                .long("frontend-url")
                .help("Base URL of the frontend, used for redirects, CORS, and email links")
                .env("HEJMO_FRONTEND_URL")
                .required(true),
        )
        .arg(
            Arg::new("public-url")
                .long("public-url")
                .help("Externally reachable base URL of this service, used for OAuth redirect URIs (defaults to the frontend URL)")
                .env("HEJMO_PUBLIC_URL"),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie lifetime in seconds")
                .default_value("2592000")
                .env("HEJMO_SESSION_TTL_SECONDS")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("issuer")
                .long("issuer")
                .help("Issuer label shown in authenticator apps")
                .default_value("hejmo")
                .env("HEJMO_2FA_ISSUER"),
        );

    let command = oauth::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "hejmo");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Household management service".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_check_port_and_frontend() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "hejmo",
            "--port",
            "8443",
            "--secret",
            "server-secret",
            "--frontend-url",
            "https://hejmo.dev",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(8443));
        assert_eq!(
            matches.get_one::<String>("frontend-url").cloned(),
            Some("https://hejmo.dev".to_string())
        );
        assert_eq!(
            matches.get_one::<u64>("session-ttl-seconds").copied(),
            Some(2_592_000)
        );
        assert_eq!(
            matches.get_one::<String>("issuer").cloned(),
            Some("hejmo".to_string())
        );
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("HEJMO_PORT", Some("443")),
                ("HEJMO_SECRET", Some("server-secret")),
                ("HEJMO_FRONTEND_URL", Some("https://hejmo.dev")),
                ("HEJMO_SESSION_TTL_SECONDS", Some("3600")),
                ("HEJMO_2FA_ISSUER", Some("hejmo-staging")),
                ("HEJMO_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["hejmo"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(443));
                assert_eq!(
                    matches.get_one::<String>("frontend-url").cloned(),
                    Some("https://hejmo.dev".to_string())
                );
                assert_eq!(
                    matches.get_one::<u64>("session-ttl-seconds").copied(),
                    Some(3600)
                );
                assert_eq!(
                    matches.get_one::<String>("issuer").cloned(),
                    Some("hejmo-staging".to_string())
                );
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    Some(2)
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("HEJMO_LOG_LEVEL", Some(level)),
                    ("HEJMO_SECRET", Some("server-secret")),
                    ("HEJMO_FRONTEND_URL", Some("https://hejmo.dev")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["hejmo"]);
                    assert_eq!(
                        matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("HEJMO_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "hejmo".to_string(),
                    "--secret".to_string(),
                    "server-secret".to_string(),
                    "--frontend-url".to_string(),
                    "https://hejmo.dev".to_string(),
                ];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();

                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_missing_secret_fails() {
        temp_env::with_vars(
            [
                ("HEJMO_SECRET", None::<&str>),
                ("HEJMO_FRONTEND_URL", Some("https://hejmo.dev")),
            ],
            || {
                let result = new().try_get_matches_from(vec!["hejmo"]);
                assert_eq!(
                    result.map(|_| ()).map_err(|e| e.kind()),
                    Err(clap::error::ErrorKind::MissingRequiredArgument)
                );
            },
        );
    }
}
