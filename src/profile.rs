use axum::{Json, extract::State};
use serde::Serialize;

use crate::AppState;
use crate::auth::AuthUser;
use crate::db::models::{User, UserProfilePatch};
use crate::db::queries;
use crate::error::ApiError;

/// Profile in the field-renamed shape the client consumes. Absent stored
/// fields come back as empty strings.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub full_name: String,
    pub doctor_id: String,
    pub email: String,
    pub hospital_name: String,
    pub area: String,
    pub profile_picture: String,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            full_name: user.full_name.unwrap_or_default(),
            doctor_id: user.doctor_id.unwrap_or_default(),
            email: user.email,
            hospital_name: user.hospital_name.unwrap_or_default(),
            area: user.area.unwrap_or_default(),
            profile_picture: user.profile_picture.unwrap_or_default(),
        }
    }
}

pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = queries::find_user_by_id(&state.db, auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(patch): Json<UserProfilePatch>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let updated = queries::update_user_profile(&state.db, auth.id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(updated.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{DateTime, oid::ObjectId};

    #[test]
    fn test_absent_fields_render_as_empty_strings() {
        let now = DateTime::now();
        let user = User {
            id: Some(ObjectId::new()),
            full_name: None,
            doctor_id: None,
            email: "doc@example.org".to_string(),
            password_hash: None,
            hospital_name: Some("City General".to_string()),
            area: None,
            profile_picture: None,
            created_at: now,
            updated_at: now,
        };

        let profile = ProfileResponse::from(user);
        assert_eq!(profile.full_name, "");
        assert_eq!(profile.doctor_id, "");
        assert_eq!(profile.email, "doc@example.org");
        assert_eq!(profile.hospital_name, "City General");
        assert_eq!(profile.area, "");
        assert_eq!(profile.profile_picture, "");
    }

    #[test]
    fn test_response_never_carries_the_credential() {
        let now = DateTime::now();
        let user = User {
            id: Some(ObjectId::new()),
            full_name: Some("Dr. Asha Rao".to_string()),
            doctor_id: None,
            email: "doc@example.org".to_string(),
            password_hash: Some("$2b$10$abcdefghijklmnopqrstuv".to_string()),
            hospital_name: None,
            area: None,
            profile_picture: None,
            created_at: now,
            updated_at: now,
        };

        let body = serde_json::to_value(ProfileResponse::from(user)).unwrap();
        assert!(body.get("password_hash").is_none());
        assert!(body.get("passwordHash").is_none());
        assert_eq!(body["full_name"], "Dr. Asha Rao");
    }
}
