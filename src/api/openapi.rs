use super::handlers::{auth, health, locale};
use utoipa::openapi::{InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::two_factor::verify))
        .routes(routes!(auth::two_factor::enroll_start))
        .routes(routes!(auth::two_factor::enroll_finish))
        .routes(routes!(auth::two_factor::regenerate_recovery_codes))
        .routes(routes!(auth::oauth::entry))
        .routes(routes!(auth::oauth::callback))
        .routes(routes!(auth::oauth::register))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::select_profile))
        .routes(routes!(auth::session::switch_profile))
        .routes(routes!(auth::session::impersonate))
        .routes(routes!(auth::session::stop_impersonating))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::verification::verify_email))
        .routes(routes!(auth::verification::forgot_password))
        .routes(routes!(auth::verification::reset_password))
        .routes(routes!(auth::verification::change_email))
        .routes(routes!(auth::verification::confirm_email_change))
        .routes(routes!(locale::get_locale))
        .routes(routes!(locale::set_locale));

    let mut hejmo_tag = Tag::new("hejmo");
    hejmo_tag.description = Some("Household management API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Sessions, two-factor, and identity linking".to_string());

    router.get_openapi_mut().tags = Some(vec![hejmo_tag, auth_tag]);

    router
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    info.license = Some(License::new(env!("CARGO_PKG_LICENSE")));

    OpenApiBuilder::new().info(info).build()
}
