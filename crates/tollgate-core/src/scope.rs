//! Capability scopes.
//!
//! Scopes are `resource:action` strings granted to accounts and API keys
//! and intersected with the tenant's allowed set at session issuance.

pub const CONVERSATIONS_READ: &str = "conversations:read";
pub const CONVERSATIONS_WRITE: &str = "conversations:write";
pub const COMPLETIONS_CREATE: &str = "completions:create";
pub const BUDGET_READ: &str = "budget:read";
pub const ADMIN_READ: &str = "admin:read";
pub const ADMIN_WRITE: &str = "admin:write";

/// Scopes every newly registered human account receives by default.
pub const DEFAULT_MEMBER_SCOPES: &[&str] = &[
    CONVERSATIONS_READ,
    CONVERSATIONS_WRITE,
    COMPLETIONS_CREATE,
    BUDGET_READ,
];

/// Returns `true` if `scope` has the `resource:action` shape with
/// lowercase ASCII segments.
pub fn is_well_formed(scope: &str) -> bool {
    let Some((resource, action)) = scope.split_once(':') else {
        return false;
    };
    let segment_ok = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    };
    segment_ok(resource) && segment_ok(action)
}

/// Intersect requested scopes with an allowed set, preserving the order
/// of `requested` and dropping duplicates.
pub fn intersect(requested: &[String], allowed: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(requested.len());
    for scope in requested {
        if allowed.iter().any(|a| a == scope) && !out.contains(scope) {
            out.push(scope.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_scopes() {
        assert!(is_well_formed("conversations:read"));
        assert!(is_well_formed("admin:write"));
        assert!(!is_well_formed("admin"));
        assert!(!is_well_formed(":write"));
        assert!(!is_well_formed("Admin:Write"));
    }

    #[test]
    fn intersection_keeps_only_allowed() {
        let requested = vec![
            ADMIN_WRITE.to_string(),
            CONVERSATIONS_READ.to_string(),
            CONVERSATIONS_READ.to_string(),
        ];
        let allowed = vec![CONVERSATIONS_READ.to_string(), BUDGET_READ.to_string()];
        assert_eq!(intersect(&requested, &allowed), vec![CONVERSATIONS_READ]);
    }
}
