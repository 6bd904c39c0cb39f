use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Profile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub company: Option<String>,
}

impl Profile {
    /// Avatar placeholder initials. Falls back to "U" when the first name is
    /// missing, matching how conversation rows render without profile joins.
    pub fn initials(&self) -> String {
        let first = self
            .first_name
            .as_deref()
            .and_then(|n| n.chars().next())
            .unwrap_or('U');
        match self.last_name.as_deref().and_then(|n| n.chars().next()) {
            Some(last) => format!("{}{}", first, last),
            None => first.to_string(),
        }
    }

    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(f), Some(l)) => format!("{} {}", f, l),
            (Some(f), None) => f.to_string(),
            (None, Some(l)) => l.to_string(),
            (None, None) => "Unknown user".to_string(),
        }
    }
}

/// The authenticated principal as reported by the backend's auth facility.
/// The matching `Profile` row is fetched separately by `user_id`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthUser {
    pub id: String,
}
