use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::FieldError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DownloadStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Status only moves forward. Setting the current status again is allowed.
    pub fn can_transition_to(self, next: DownloadStatus) -> bool {
        if self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub id: Uuid,
    pub video_url: String,
    pub resolution: String,
    pub status: DownloadStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDownloadRequest {
    pub video_url: String,
    pub resolution: String,
}

impl NewDownloadRequest {
    /// Checks the shape of a `/api/download` body and collects one error per
    /// offending field.
    pub fn from_json(body: &Value) -> Result<Self, Vec<FieldError>> {
        let Some(object) = body.as_object() else {
            return Err(vec![FieldError::new(
                Vec::new(),
                format!("Expected object, received {}", json_type_name(body)),
            )]);
        };

        let mut errors = Vec::new();
        let video_url = required_string(object.get("videoUrl"), "videoUrl", &mut errors);
        let resolution = required_string(object.get("resolution"), "resolution", &mut errors);

        match (video_url, resolution) {
            (Some(video_url), Some(resolution)) if errors.is_empty() => Ok(Self {
                video_url,
                resolution,
            }),
            _ => Err(errors),
        }
    }
}

fn required_string(
    value: Option<&Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        Some(Value::String(value)) => Some(value.clone()),
        None | Some(Value::Null) => {
            errors.push(FieldError::new(vec![field.to_string()], "Required"));
            None
        }
        Some(other) => {
            errors.push(FieldError::new(
                vec![field.to_string()],
                format!("Expected string, received {}", json_type_name(other)),
            ));
            None
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    P360,
    P480,
    P720,
}

impl Resolution {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "360p" => Some(Self::P360),
            "480p" => Some(Self::P480),
            "720p" => Some(Self::P720),
            _ => None,
        }
    }

    pub fn quality(self) -> Quality {
        match self {
            Self::P360 => Quality { max_height: 360 },
            Self::P480 => Quality { max_height: 480 },
            Self::P720 => Quality { max_height: 720 },
        }
    }
}

/// Quality handed to the extractor. Unknown resolution labels select 480p.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality {
    pub max_height: u32,
}

impl Quality {
    pub fn for_label(label: &str) -> Self {
        Resolution::parse(label)
            .unwrap_or(Resolution::P480)
            .quality()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub title: String,
    pub duration: String,
    pub views: String,
    pub thumbnail: String,
    pub video_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_moves_forward_only() {
        use DownloadStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Processing));

        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn unknown_resolution_selects_480p() {
        assert_eq!(Quality::for_label("720p").max_height, 720);
        assert_eq!(Quality::for_label("360p").max_height, 360);
        assert_eq!(Quality::for_label("1080p").max_height, 480);
        assert_eq!(Quality::for_label("").max_height, 480);
    }

    #[test]
    fn download_body_requires_both_fields() {
        let errors = NewDownloadRequest::from_json(&json!({ "videoUrl": 12 })).unwrap_err();
        let paths: Vec<_> = errors.iter().map(|error| error.path.clone()).collect();
        assert_eq!(
            paths,
            vec![vec!["videoUrl".to_string()], vec!["resolution".to_string()]]
        );
        assert_eq!(errors[0].message, "Expected string, received number");
        assert_eq!(errors[1].message, "Required");

        let errors = NewDownloadRequest::from_json(&json!(["nope"])).unwrap_err();
        assert!(errors[0].path.is_empty());

        let request = NewDownloadRequest::from_json(&json!({
            "videoUrl": "https://youtu.be/dQw4w9WgXcQ",
            "resolution": "4k",
        }))
        .unwrap();
        assert_eq!(request.resolution, "4k");
    }

    #[test]
    fn download_request_serializes_camel_case() {
        let request = DownloadRequest {
            id: Uuid::nil(),
            video_url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            resolution: "720p".to_string(),
            status: DownloadStatus::Processing,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["videoUrl"], "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(value["status"], "processing");
        assert!(value.get("createdAt").is_some());
    }
}
