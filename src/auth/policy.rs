//! Route policy: which permission each API-key-scoped route requires.
//!
//! The mapping is plain configuration data handed to the gate at
//! construction, so tests can run the gate against alternate policies.

use chrono::Utc;
use thiserror::Error;

use super::{ApiKeyRecord, Permission};

/// Why a key was denied for a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("API key expired")]
    Expired,

    #[error("missing required permission: {0}")]
    MissingPermission(Permission),

    #[error("unknown route")]
    UnknownRoute,
}

/// Immutable route-to-permission table.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    routes: Vec<(String, Permission)>,
}

impl RoutePolicy {
    pub fn new(routes: Vec<(String, Permission)>) -> Self {
        Self { routes }
    }

    /// The permission required for a route, if the route is known.
    pub fn required(&self, route: &str) -> Option<Permission> {
        self.routes
            .iter()
            .find(|(path, _)| path == route)
            .map(|(_, permission)| *permission)
    }

    pub fn is_scoped(&self, route: &str) -> bool {
        self.required(route).is_some()
    }

    /// Authorize a key record for a route.
    ///
    /// Expiry is checked before the permission lookup, so an expired key
    /// is reported as expired even when it also lacks the permission. A
    /// record without a permissions object is never authorized.
    pub fn authorize(&self, record: &ApiKeyRecord, route: &str) -> Result<(), Denial> {
        if record.expired_at(Utc::now()) {
            return Err(Denial::Expired);
        }

        let required = self.required(route).ok_or(Denial::UnknownRoute)?;

        match record.permissions {
            Some(permissions) if permissions.allows(required) => Ok(()),
            _ => Err(Denial::MissingPermission(required)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Permissions;
    use chrono::Duration;

    fn policy() -> RoutePolicy {
        RoutePolicy::new(vec![
            ("/api/blacklist/check-api".to_string(), Permission::Read),
            ("/api/blacklist/add-api".to_string(), Permission::Add),
        ])
    }

    fn key_with(permissions: Permissions) -> ApiKeyRecord {
        let mut record = ApiKeyRecord::new("bg_test");
        record.permissions = Some(permissions);
        record
    }

    #[test]
    fn read_only_key_is_scoped_to_read_routes() {
        let policy = policy();
        let record = key_with(Permissions::read_only());

        assert_eq!(policy.authorize(&record, "/api/blacklist/check-api"), Ok(()));
        assert_eq!(
            policy.authorize(&record, "/api/blacklist/add-api"),
            Err(Denial::MissingPermission(Permission::Add))
        );
    }

    #[test]
    fn key_without_permissions_object_is_never_authorized() {
        let policy = policy();
        let record = ApiKeyRecord::new("bg_test");
        assert_eq!(
            policy.authorize(&record, "/api/blacklist/check-api"),
            Err(Denial::MissingPermission(Permission::Read))
        );
    }

    #[test]
    fn expired_key_is_denied_before_permission_lookup() {
        let policy = policy();
        let mut record = key_with(Permissions::full());
        record.expiry_date = Some(Utc::now() - Duration::days(1));

        // fully-permissioned but expired: expiry wins
        assert_eq!(
            policy.authorize(&record, "/api/blacklist/add-api"),
            Err(Denial::Expired)
        );
        // even on an unknown route
        assert_eq!(
            policy.authorize(&record, "/api/unknown"),
            Err(Denial::Expired)
        );
    }

    #[test]
    fn unknown_route_is_distinguished() {
        let policy = policy();
        let record = key_with(Permissions::full());
        assert_eq!(
            policy.authorize(&record, "/api/unknown"),
            Err(Denial::UnknownRoute)
        );
    }
}
