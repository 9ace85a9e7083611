//! Typed user identity shared by the token issuer, the credential
//! validator, and the client session machinery.

use serde::{Deserialize, Serialize};

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Player,
    Organizer,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Player => "player",
            UserRole::Organizer => "organizer",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            "organizer" => UserRole::Organizer,
            _ => UserRole::Player,
        }
    }
}

/// Immutable projection of a user record. Produced once during token
/// issuance or validation; never mutated, only replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Public user UUID
    pub uuid: String,
    /// Email address (login name)
    pub email: String,
    /// Display name shown in the UI
    pub display_name: String,
    /// Role claim, resolved once into a closed enumeration
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::Player, UserRole::Organizer, UserRole::Admin] {
            assert_eq!(UserRole::from_str(role.as_str()), role);
        }
    }

    #[test]
    fn test_unknown_role_defaults_to_player() {
        assert_eq!(UserRole::from_str("superuser"), UserRole::Player);
        assert_eq!(UserRole::from_str(""), UserRole::Player);
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&UserRole::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let role: UserRole = serde_json::from_str("\"organizer\"").unwrap();
        assert_eq!(role, UserRole::Organizer);
    }
}
