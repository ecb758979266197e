use serde::{Deserialize, Serialize};

use super::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    pub email: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Compact user reference embedded in events, tasks and projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

fn default_role() -> String {
    "member".to_string()
}

impl User {
    /// Profile used when the server accepted a token but the profile lookup failed.
    pub fn fallback_for_email(email: &str) -> Self {
        let name = email
            .split('@')
            .next()
            .filter(|local| !local.is_empty())
            .unwrap_or(email)
            .to_string();

        Self {
            id: 0,
            email: email.to_string(),
            name,
            role: default_role(),
            department: None,
            avatar_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_profile_uses_local_part_as_name() {
        let user = User::fallback_for_email("ada@example.com");

        assert_eq!(user.name, "ada");
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role, "member");
    }

    #[test]
    fn fallback_profile_keeps_email_without_at_sign() {
        let user = User::fallback_for_email("ada");

        assert_eq!(user.name, "ada");
    }

    #[test]
    fn user_without_role_gets_member() {
        let user: User =
            serde_json::from_str(r#"{"id":7,"email":"a@b.c","name":"A"}"#).unwrap();

        assert_eq!(user.role, "member");
        assert_eq!(user.department, None);
    }
}
