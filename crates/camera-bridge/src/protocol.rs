//! Wire protocol for client <-> camera host communication
//!
//! Messages are serialized as JSON with internally-tagged enums.
//! Format: {"Id": 7, "Body": {"Type": "MessageType", ...fields}}
//!
//! Byte payloads (images, point clouds) are carried as base64 strings.

use camera_core::{ResponseMetadata, WireProperties};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request for a single image
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetImageRequest {
    pub name: String,
    /// Desired MIME type, without lazy qualifier; empty lets the host choose
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// A single encoded image
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetImageResponse {
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,
}

/// Request for every image the camera can produce at once
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetImagesRequest {
    pub name: String,
}

/// One image in a bundle. `format` is the raw wire tag, checked on decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WireImage {
    pub source_name: String,
    pub format: i32,
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,
}

/// Image bundle plus capture metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetImagesResponse {
    pub images: Vec<WireImage>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

/// Request for a point cloud
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetPointCloudRequest {
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Encoded point cloud
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetPointCloudResponse {
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub point_cloud: Vec<u8>,
}

/// Request for camera properties
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GetPropertiesRequest {
    pub name: String,
}

/// Arbitrary command for the camera host
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DoCommandRequest {
    pub name: String,
    pub command: Map<String, Value>,
}

/// Result of an arbitrary command
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DoCommandResponse {
    pub result: Map<String, Value>,
}

/// Error reported by the camera host
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Client -> host messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum CameraRequest {
    GetImage(GetImageRequest),
    GetImages(GetImagesRequest),
    GetPointCloud(GetPointCloudRequest),
    GetProperties(GetPropertiesRequest),
    DoCommand(DoCommandRequest),
}

impl CameraRequest {
    /// Message type name, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            CameraRequest::GetImage(_) => "GetImage",
            CameraRequest::GetImages(_) => "GetImages",
            CameraRequest::GetPointCloud(_) => "GetPointCloud",
            CameraRequest::GetProperties(_) => "GetProperties",
            CameraRequest::DoCommand(_) => "DoCommand",
        }
    }
}

/// Host -> client messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum CameraResponse {
    Image(GetImageResponse),
    Images(GetImagesResponse),
    PointCloud(GetPointCloudResponse),
    Properties(WireProperties),
    CommandResult(DoCommandResponse),
    Error(RpcError),
}

/// Correlates a response with the request that caused it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope<T> {
    pub id: u64,
    pub body: T,
}

/// Serialize a message to JSON bytes
pub fn serialize<T: Serialize>(msg: &Envelope<T>) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(msg)
}

/// Deserialize a message from JSON bytes
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<Envelope<T>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Custom serialization for binary data as base64
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_format() {
        let msg = Envelope {
            id: 7,
            body: CameraRequest::GetImage(GetImageRequest {
                name: "front".into(),
                mime_type: "image/jpeg".into(),
                extra: Map::new(),
            }),
        };
        let bytes = serialize(&msg).unwrap();
        let json = String::from_utf8_lossy(&bytes);

        assert!(json.contains("\"Id\":7"));
        assert!(json.contains("\"Type\":\"GetImage\""));
        assert!(json.contains("\"Name\":\"front\""));

        let decoded: Envelope<CameraRequest> = deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_images_from_host() {
        // Exact JSON format expected from camera hosts
        let json = r#"{"Id":3,"Body":{"Type":"Images","Images":[{"SourceName":"depth","Format":2,"Image":"AAEC"}],"ResponseMetadata":{"CapturedAtMs":1700000000000}}}"#;

        let decoded: Envelope<CameraResponse> = deserialize(json.as_bytes()).unwrap();
        assert_eq!(decoded.id, 3);
        match decoded.body {
            CameraResponse::Images(resp) => {
                assert_eq!(resp.images.len(), 1);
                assert_eq!(resp.images[0].source_name, "depth");
                assert_eq!(resp.images[0].format, 2);
                assert_eq!(resp.images[0].image, vec![0, 1, 2]);
                assert_eq!(resp.response_metadata.captured_at_ms, Some(1_700_000_000_000));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_properties_and_error_bodies() {
        let json = r#"{"Id":1,"Body":{"Type":"Properties","MimeTypes":["image/png"],"SupportsPcd":true}}"#;
        let decoded: Envelope<CameraResponse> = deserialize(json.as_bytes()).unwrap();
        match decoded.body {
            CameraResponse::Properties(props) => {
                assert!(props.supports_pcd);
                assert_eq!(props.mime_types, vec!["image/png".to_string()]);
            }
            other => panic!("Wrong message type: {:?}", other),
        }

        let json = r#"{"Id":2,"Body":{"Type":"Error","Code":-32000,"Message":"no such camera"}}"#;
        let decoded: Envelope<CameraResponse> = deserialize(json.as_bytes()).unwrap();
        assert_eq!(
            decoded.body,
            CameraResponse::Error(RpcError {
                code: -32000,
                message: "no such camera".into()
            })
        );
    }

    #[test]
    fn test_bad_base64_rejected() {
        let json = r#"{"Id":1,"Body":{"Type":"Image","MimeType":"image/png","Image":"***"}}"#;
        assert!(deserialize::<CameraResponse>(json.as_bytes()).is_err());
    }
}
