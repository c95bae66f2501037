//! Tenant resolution for the brain HTTP surface.
//!
//! Path segment first, `x-tenant-slug` header second. The path always wins
//! when both are present — a spoofed header must never redirect a request
//! to another tenant's data. Every downstream query is scoped by the
//! resolved tenant id, so cross-tenant reads are impossible through this
//! surface.

use axum::http::HeaderMap;

use crate::error::{KioskError, Result};
use crate::store::{BookingStore, Tenant};

/// Header carrying the tenant slug when the path has none.
pub const TENANT_HEADER: &str = "x-tenant-slug";

/// Resolve the tenant for a request.
///
/// # Errors
///
/// `KioskError::TenantNotFound` when no slug is supplied or the slug does
/// not resolve.
pub fn resolve_tenant(
    store: &BookingStore,
    path_slug: Option<&str>,
    headers: &HeaderMap,
) -> Result<Tenant> {
    let header_slug = headers.get(TENANT_HEADER).and_then(|v| v.to_str().ok());

    let slug = path_slug
        .filter(|s| !s.is_empty())
        .or(header_slug)
        .ok_or_else(|| KioskError::TenantNotFound("no tenant slug supplied".to_owned()))?;

    store
        .tenant_by_slug(slug)?
        .ok_or_else(|| KioskError::TenantNotFound(slug.to_owned()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn store() -> BookingStore {
        let store = BookingStore::in_memory().unwrap();
        store.seed_demo().unwrap();
        store
    }

    #[test]
    fn path_slug_resolves() {
        let store = store();
        let tenant = resolve_tenant(&store, Some("grand-hotel"), &HeaderMap::new()).unwrap();
        assert_eq!(tenant.slug, "grand-hotel");
    }

    #[test]
    fn header_used_when_path_absent() {
        let store = store();
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, "budget-inn".parse().unwrap());
        let tenant = resolve_tenant(&store, None, &headers).unwrap();
        assert_eq!(tenant.slug, "budget-inn");
    }

    #[test]
    fn path_wins_over_spoofed_header() {
        let store = store();
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, "grand-hotel".parse().unwrap());
        let tenant = resolve_tenant(&store, Some("budget-inn"), &headers).unwrap();
        assert_eq!(tenant.slug, "budget-inn");
    }

    #[test]
    fn unknown_slug_is_not_found() {
        let store = store();
        let err = resolve_tenant(&store, Some("ghost-hotel"), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, KioskError::TenantNotFound(_)));
    }

    #[test]
    fn missing_slug_is_not_found() {
        let store = store();
        let err = resolve_tenant(&store, None, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, KioskError::TenantNotFound(_)));
    }
}
