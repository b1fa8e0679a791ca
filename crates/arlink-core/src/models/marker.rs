//! Marker artifact format.
//!
//! The artifact consumed by the AR viewer to recognize a source image:
//! `{version, type: "image", width, height, trackingData}`. The tracking
//! payload is opaque; it comes straight from the compiler capability.

use serde::{Deserialize, Serialize};

pub const MARKER_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarkerArtifact {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    /// Must match the source image dimensions.
    pub width: u32,
    pub height: u32,
    pub tracking_data: serde_json::Value,
}

impl MarkerArtifact {
    pub fn image(width: u32, height: u32, tracking_data: serde_json::Value) -> Self {
        Self {
            version: MARKER_FORMAT_VERSION,
            kind: "image".to_string(),
            width,
            height,
            tracking_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_serializes_with_wire_field_names() {
        let artifact = MarkerArtifact::image(640, 480, serde_json::json!({"points": []}));
        let json = serde_json::to_value(&artifact).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["type"], "image");
        assert_eq!(json["width"], 640);
        assert_eq!(json["height"], 480);
        assert!(json["trackingData"].is_object());
    }
}
