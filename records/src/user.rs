use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Student,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Time-gated class resource link shared with students.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassLink {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub available_from: DateTime<Utc>,
    pub available_until: DateTime<Utc>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ClassLink {
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.available_from <= now && now <= self.available_until
    }
}
