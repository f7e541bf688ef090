//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of every custom resource managed by the operator
pub const API_GROUP: &str = "v1.edp.epam.com";

/// Field manager name used for server-side writes
pub const FIELD_MANAGER: &str = "keycloak-operator";

/// Status value written after a successful reconciliation
pub const STATUS_OK: &str = "OK";

/// Prefix of the secret that caches the admin access token of a Keycloak instance
pub const TOKEN_SECRET_PREFIX: &str = "kc-token";

/// Key inside the token cache secret holding the serialized token
pub const TOKEN_SECRET_KEY: &str = "token";

/// Keys inside the credential secret referenced by `Keycloak.spec.secret`
pub const CREDENTIALS_USERNAME_KEY: &str = "username";
pub const CREDENTIALS_PASSWORD_KEY: &str = "password";

/// Realm used for the admin authentication handshake
pub const ADMIN_REALM: &str = "master";

/// Client used for the password grant of user-type admins
pub const ADMIN_CLI_CLIENT: &str = "admin-cli";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default requeue interval after a successful reconciliation (seconds)
/// Zero disables periodic reconciliation (wait for a change instead)
pub const DEFAULT_SUCCESS_RECONCILE_TIMEOUT_SECS: u64 = 3600;

/// Default base delay of the failure backoff (seconds)
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 10;

/// Default ceiling of the failure backoff (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 600;

/// Default requeue delay after an optimistic write conflict (seconds)
pub const DEFAULT_CONFLICT_REQUEUE_SECS: u64 = 1;

/// Default timeout of a single Keycloak HTTP request (seconds)
pub const DEFAULT_KEYCLOAK_HTTP_TIMEOUT_SECS: u64 = 30;

/// A cached token this close to expiry is treated as expired (seconds)
pub const DEFAULT_TOKEN_EXPIRY_SKEW_SECS: i64 = 30;

/// Default maximum number of concurrent reconciliations per resource kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

pub const CLIENT_SCOPE_FINALIZER: &str = "keycloak.clientscope.operator.finalizer.name";
pub const REALM_GROUP_FINALIZER: &str = "keycloak.realmgroup.operator.finalizer.name";
pub const AUTH_FLOW_FINALIZER: &str = "keycloak.authflow.operator.finalizer.name";
pub const REALM_COMPONENT_FINALIZER: &str = "keycloak.realmcomponent.operator.finalizer.name";
