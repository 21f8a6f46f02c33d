use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// One registered clinician. Stored in the `users` collection with a
/// unique index on `email`.
///
/// `password_hash` is an `Option` so that a record missing its credential
/// deserializes instead of erroring: that situation is a data-integrity
/// fault the login path must detect and report, not a parse failure. It is
/// also what lets the redacting projections drop the field on reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// Base64-encoded profile image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Profile fields accepted at registration, alongside email and password.
#[derive(Debug, Clone, Default)]
pub struct NewUserProfile {
    pub full_name: Option<String>,
    pub doctor_id: Option<String>,
    pub hospital_name: Option<String>,
    pub area: Option<String>,
}

impl User {
    pub fn new(email: String, password_hash: String, profile: NewUserProfile) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            full_name: profile.full_name,
            doctor_id: profile.doctor_id,
            email,
            password_hash: Some(password_hash),
            hospital_name: profile.hospital_name,
            area: profile.area,
            profile_picture: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial profile update. An absent field is left untouched; an explicit
/// empty string is a valid "clear" value. The credential deliberately has
/// no counterpart here, so it can never travel through this path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserProfilePatch {
    pub full_name: Option<String>,
    pub doctor_id: Option<String>,
    pub hospital_name: Option<String>,
    pub area: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Low
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    /// Percentage in [0, 100].
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
}

/// Completed classification result as reported by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResults {
    pub diagnosis: String,
    /// Percentage in [0, 100].
    pub confidence: f64,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<Recommendation>,
    /// Seconds spent in the classification pipeline, non-negative.
    pub processing_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientInfo {
    pub name: String,
    /// Years, in [0, 150].
    pub age: i32,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referring_doctor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
}

/// Where the study's bytes live. Exactly one representation is
/// authoritative per record; when a stored document carries both legacy
/// columns, the inline payload wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePayload {
    /// Server-side storage path.
    Stored(String),
    /// Base64 data URL, kept inline in the document.
    Inline(String),
}

/// One completed diagnostic run, owned by exactly one user. Immutable
/// after insert; there is no update or delete path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub file_name: String,
    pub original_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: AnalysisStatus,
    pub results: AnalysisResults,
    // Legacy column pair backing `FilePayload`. Only ever written through
    // `Analysis::new`, which fills at most one of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    /// Study type/category label (MRI, X-Ray, Histopathology, EEG, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_info: Option<PatientInfo>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Analysis {
    /// Build a record for the one reachable write path: a completed
    /// result. Status is always `completed` and timestamps are assigned
    /// here, server-side. A missing payload is stored as such.
    pub fn new(
        user_id: ObjectId,
        file_name: String,
        file_type: String,
        file_size: i64,
        image_type: Option<String>,
        payload: Option<FilePayload>,
        results: AnalysisResults,
        patient_info: Option<PatientInfo>,
    ) -> Self {
        let (file_path, file_data) = match payload {
            Some(FilePayload::Stored(path)) => (Some(path), None),
            Some(FilePayload::Inline(data)) => (None, Some(data)),
            None => (None, None),
        };
        let now = DateTime::now();
        Self {
            id: None,
            user_id,
            original_name: file_name.clone(),
            file_name,
            file_type,
            file_size,
            status: AnalysisStatus::Completed,
            results,
            file_path,
            file_data,
            image_type,
            patient_info,
            created_at: now,
            updated_at: now,
        }
    }

    /// Authoritative payload for this record, applying the inline-wins
    /// rule for legacy documents that carry both columns.
    pub fn payload(&self) -> Option<FilePayload> {
        if let Some(data) = &self.file_data {
            return Some(FilePayload::Inline(data.clone()));
        }
        self.file_path.clone().map(FilePayload::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(diagnosis: &str) -> AnalysisResults {
        AnalysisResults {
            diagnosis: diagnosis.to_string(),
            confidence: 91.5,
            findings: vec![],
            recommendations: vec![],
            processing_time: 2.4,
        }
    }

    #[test]
    fn test_enum_wire_spellings() {
        assert_eq!(
            serde_json::to_string(&AnalysisStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&Severity::Critical).unwrap(),
            "\"critical\""
        );
        assert_eq!(
            serde_json::to_string(&Priority::Medium).unwrap(),
            "\"medium\""
        );
        assert_eq!(serde_json::to_string(&Gender::Male).unwrap(), "\"Male\"");

        let gender: Gender = serde_json::from_str("\"Other\"").unwrap();
        assert_eq!(gender, Gender::Other);
        assert!(serde_json::from_str::<Gender>("\"male\"").is_err());
    }

    #[test]
    fn test_finding_and_recommendation_schema_defaults() {
        let finding: Finding = serde_json::from_str(
            r#"{ "type": "mass", "description": "left hemisphere", "confidence": 72.0 }"#,
        )
        .unwrap();
        assert_eq!(finding.severity, Severity::Low);

        let rec: Recommendation =
            serde_json::from_str(r#"{ "type": "follow-up", "description": "MRI in 3 months" }"#)
                .unwrap();
        assert_eq!(rec.priority, Priority::Medium);
    }

    #[test]
    fn test_new_analysis_is_completed_with_server_timestamps() {
        let analysis = Analysis::new(
            ObjectId::new(),
            "scan.png".to_string(),
            "image".to_string(),
            1024,
            Some("MRI".to_string()),
            None,
            results("Glioma"),
            None,
        );
        assert_eq!(analysis.status, AnalysisStatus::Completed);
        assert!(analysis.id.is_none());
        assert_eq!(analysis.created_at, analysis.updated_at);
        assert_eq!(analysis.original_name, "scan.png");
    }

    #[test]
    fn test_payload_fills_exactly_one_column() {
        let inline = Analysis::new(
            ObjectId::new(),
            "scan.png".into(),
            "image".into(),
            10,
            None,
            Some(FilePayload::Inline("data:image/png;base64,AAAA".into())),
            results("Glioma"),
            None,
        );
        assert!(inline.file_data.is_some());
        assert!(inline.file_path.is_none());

        let stored = Analysis::new(
            ObjectId::new(),
            "scan.png".into(),
            "image".into(),
            10,
            None,
            Some(FilePayload::Stored("/uploads/scan.png".into())),
            results("Glioma"),
            None,
        );
        assert!(stored.file_path.is_some());
        assert!(stored.file_data.is_none());

        let absent = Analysis::new(
            ObjectId::new(),
            "scan.png".into(),
            "image".into(),
            10,
            None,
            None,
            results("Glioma"),
            None,
        );
        assert!(absent.payload().is_none());
    }

    #[test]
    fn test_payload_prefers_inline_when_both_columns_present() {
        let mut analysis = Analysis::new(
            ObjectId::new(),
            "scan.png".into(),
            "image".into(),
            10,
            None,
            Some(FilePayload::Inline("data:image/png;base64,AAAA".into())),
            results("Glioma"),
            None,
        );
        // Legacy documents may carry both columns.
        analysis.file_path = Some("/uploads/scan.png".into());

        assert_eq!(
            analysis.payload(),
            Some(FilePayload::Inline("data:image/png;base64,AAAA".into()))
        );
    }

    #[test]
    fn test_bson_field_names_match_legacy_schema() {
        let analysis = Analysis::new(
            ObjectId::new(),
            "scan.png".into(),
            "image".into(),
            10,
            Some("X-Ray".into()),
            None,
            results("Pneumonia"),
            None,
        );
        let doc = mongodb::bson::to_document(&analysis).unwrap();
        for key in [
            "userId",
            "fileName",
            "originalName",
            "fileType",
            "fileSize",
            "status",
            "results",
            "imageType",
            "createdAt",
            "updatedAt",
        ] {
            assert!(doc.contains_key(key), "missing key {key}");
        }
        assert!(!doc.contains_key("_id"));
    }
}
