use serde::{Deserialize, Serialize};

/// Minimal per-node record: identity, position and sequence membership.
///
/// Core data is what a spatial cell query returns, and is enough to place a
/// node in the spatial index. Everything else arrives with the fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreNodeData {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_key: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<f64>,
}

/// Capture metadata that completes a core record into a full node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillNodeData {
    pub captured_at: i64,
    pub compass_angle: f64,
    pub orientation: i32,
    pub focal: f64,
    pub atomic_scale: f64,
    pub camera_rotation: [f64; 3],
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_cc: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pano: Option<PanoCrop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserData>,
}

/// Crop of an equirectangular panorama inside its full sphere.
///
/// Coordinates are pixels in the full panorama frame. A crop covering the
/// whole frame is a full 360 panorama.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanoCrop {
    pub full_width: u32,
    pub full_height: u32,
    pub cropped_left: u32,
    pub cropped_top: u32,
    pub cropped_width: u32,
    pub cropped_height: u32,
}

impl PanoCrop {
    pub fn is_full(&self) -> bool {
        self.cropped_left == 0
            && self.cropped_top == 0
            && self.cropped_width == self.full_width
            && self.cropped_height == self.full_height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub key: String,
    pub username: String,
}

/// Complete node record as returned by the full metadata endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullNodeData {
    #[serde(flatten)]
    pub core: CoreNodeData,
    #[serde(flatten)]
    pub fill: FillNodeData,
}

/// Ordered list of node keys forming a capture sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceData {
    pub key: String,
    pub keys: Vec<String>,
}
