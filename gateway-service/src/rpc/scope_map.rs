//! # Method → Scope Allow-List
//!
//! The authorization table of the RPC plane, **deny by default**: a method
//! missing from this table is refused before dispatch, for every caller,
//! including holders of wildcard keys over unmapped names.
//!
//! The table is data, not code. Adding an RPC method requires adding a row
//! here; the dispatcher consults [`required_scope`] and nothing else.

/// The static `{method → required scope}` table.
///
/// API-key callers need the mapped scope in their scope set (the `all`
/// wildcard covers any **mapped** method). Application-secret callers are
/// additionally filtered by the application's `allowed_rpc_scopes`.
pub const METHOD_SCOPES: &[(&str, &str)] = &[
    // Token operations
    ("ValidateToken", "tokens:validate"),
    ("IntrospectToken", "tokens:validate"),
    // Directory
    ("GetUser", "users:read"),
    ("CreateUser", "auth:register"),
    ("SyncUsers", "users:sync"),
    // RBAC
    ("CheckPermission", "rbac:check"),
    // Tenancy
    ("GetApplicationAuthConfig", "applications:read"),
    ("GetUserApplicationProfile", "profiles:read"),
    // Authentication flows
    ("Login", "auth:login"),
    ("LoginWithOTP", "auth:login"),
    ("VerifyLoginOTP", "auth:login"),
    ("RegisterWithOTP", "auth:register"),
    ("VerifyRegistrationOTP", "auth:register"),
    ("InitPasswordlessRegistration", "auth:register"),
    ("CompletePasswordlessRegistration", "auth:register"),
    // OTP
    ("SendOTP", "otp:send"),
    ("VerifyOTP", "otp:verify"),
    // Messaging
    ("SendEmail", "messaging:send"),
    // OAuth introspection surface
    ("IntrospectOAuthToken", "oauth:introspect"),
    ("ValidateOAuthClient", "oauth:clients:read"),
    ("GetOAuthClient", "oauth:clients:read"),
    // Cross-application exchange
    ("CreateTokenExchange", "exchange:create"),
    ("RedeemTokenExchange", "exchange:redeem"),
];

/// Looks up the scope a method requires. `None` means the method is not
/// allow-listed and must be denied.
pub fn required_scope(method: &str) -> Option<&'static str> {
    METHOD_SCOPES
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, scope)| *scope)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_spec_method_is_mapped() {
        // The inter-service contract: each of these must stay mapped
        let required = [
            "ValidateToken",
            "IntrospectToken",
            "GetUser",
            "CheckPermission",
            "GetApplicationAuthConfig",
            "GetUserApplicationProfile",
            "CreateUser",
            "Login",
            "SendOTP",
            "VerifyOTP",
            "LoginWithOTP",
            "VerifyLoginOTP",
            "RegisterWithOTP",
            "VerifyRegistrationOTP",
            "InitPasswordlessRegistration",
            "CompletePasswordlessRegistration",
            "SyncUsers",
            "SendEmail",
            "IntrospectOAuthToken",
            "ValidateOAuthClient",
            "GetOAuthClient",
            "CreateTokenExchange",
            "RedeemTokenExchange",
        ];

        for method in required {
            assert!(
                required_scope(method).is_some(),
                "method {} lost its allow-list entry",
                method
            );
        }
    }

    #[test]
    fn test_unknown_methods_are_denied() {
        assert_eq!(required_scope("Foo"), None);
        assert_eq!(required_scope("DeleteEverything"), None);
        assert_eq!(required_scope(""), None);
        // Case matters: the table is exact-match
        assert_eq!(required_scope("getuser"), None);
    }

    #[test]
    fn test_scope_labels_are_well_formed() {
        for (method, scope) in METHOD_SCOPES {
            assert!(!method.is_empty());
            assert!(
                scope
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ':' || c == '_'),
                "scope {} for {} is not a valid label",
                scope,
                method
            );
        }
    }
}
