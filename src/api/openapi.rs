use super::handlers::{auth, health, me};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
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
/// Routes added outside (like `/`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Registration, login, and token flows".to_string());

    let mut me_tag = Tag::new("me");
    me_tag.description = Some("Authenticated self-service".to_string());

    let mut openapi = cargo_openapi();
    openapi.tags = Some(vec![auth_tag, me_tag]);

    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    let router = OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::verification::new_verification))
        .routes(routes!(auth::reset::reset))
        .routes(routes!(auth::reset::new_password))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::logout))
        .routes(routes!(me::get_me, me::patch_me));

    router
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

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

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

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Janua"));
            assert_eq!(contact.email.as_deref(), Some("team@janua.dev"));
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "auth"));
        assert!(tags.iter().any(|tag| tag.name == "me"));
        assert!(spec.paths.paths.contains_key("/v1/auth/login"));
        assert!(spec.paths.paths.contains_key("/v1/auth/register"));
        assert!(spec.paths.paths.contains_key("/v1/auth/new-verification"));
        assert!(spec.paths.paths.contains_key("/v1/auth/new-password"));
        assert!(spec.paths.paths.contains_key("/v1/auth/session"));
        assert!(spec.paths.paths.contains_key("/v1/me"));
    }
}
