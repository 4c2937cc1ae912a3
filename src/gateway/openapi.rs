use super::handlers::{create_user, delete_user, enable_mfa, health, reset_password};
use utoipa::openapi::{
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Contact, InfoBuilder, License, OpenApiBuilder, Tag,
};
use utoipa_axum::{router::OpenApiRouter, routes};

/// Name of the bearer scheme referenced by the admin routes.
pub const ADMIN_SECURITY_SCHEME: &str = "admin_key";

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = OpenApiRouter::with_openapi(cargo_openapi())
        .merge(public_router())
        .merge(admin_router())
        .split_for_parts();
    openapi
}

/// Routes served without the admin gate.
pub(crate) fn public_router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(health::health))
}

/// Routes that require `Authorization: Bearer <ADMIN_API_KEY>`.
///
/// Add new admin endpoints here so they are both gated and documented.
pub(crate) fn admin_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(create_user::create_user))
        .routes(routes!(reset_password::reset_password))
        .routes(routes!(delete_user::delete_user))
        .routes(routes!(enable_mfa::enable_mfa))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    let mut openapi = OpenApiBuilder::new().info(info).build();

    let mut admin_tag = Tag::new("admin");
    admin_tag.description = Some("User lifecycle operations, admin key required".to_string());
    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Liveness and build information".to_string());
    openapi.tags = Some(vec![admin_tag, health_tag]);

    openapi
        .components
        .get_or_insert_with(Default::default)
        .add_security_scheme(
            ADMIN_SECURITY_SCHEME,
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );

    openapi
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (
            optional_str(name),
            optional_str(email.trim_end_matches('>')),
        ),
        None => (optional_str(author), None),
    }
}
