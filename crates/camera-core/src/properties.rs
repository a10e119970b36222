//! Camera properties and their resolution from wire data

use crate::distortion::{Distorter, DistortionRegistry};
use crate::error::{CameraError, Result};
use crate::intrinsics::{PinholeCameraIntrinsics, Projector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Intrinsic parameters as reported by the camera
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct IntrinsicParameters {
    pub width_px: u32,
    pub height_px: u32,
    pub focal_x_px: f64,
    pub focal_y_px: f64,
    pub center_x_px: f64,
    pub center_y_px: f64,
}

/// Distortion descriptor as reported by the camera
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DistortionParameters {
    /// Model name; empty means no distortion
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub parameters: Vec<f64>,
}

/// Properties payload of a `GetProperties` response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WireProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsic_parameters: Option<IntrinsicParameters>,
    #[serde(default)]
    pub mime_types: Vec<String>,
    #[serde(default)]
    pub supports_pcd: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distortion_parameters: Option<DistortionParameters>,
}

/// Resolved camera properties
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// Whether the camera can produce point clouds
    pub supports_pcd: bool,
    /// MIME types the camera can produce
    pub mime_types: Vec<String>,
    /// Intrinsics, unvalidated until a projector is requested
    pub intrinsics: Option<PinholeCameraIntrinsics>,
    /// Distortion model, resolved through a [`DistortionRegistry`]
    pub distortion: Option<Arc<dyn Distorter>>,
}

impl Properties {
    /// Convert wire properties into domain properties.
    ///
    /// Intrinsics are copied as-is. A distortion descriptor with an empty
    /// model name is treated as no distortion; any other name must resolve in
    /// `registry`.
    pub fn resolve(wire: WireProperties, registry: &DistortionRegistry) -> Result<Self> {
        let intrinsics = wire
            .intrinsic_parameters
            .map(|p| PinholeCameraIntrinsics {
                width: p.width_px,
                height: p.height_px,
                fx: p.focal_x_px,
                fy: p.focal_y_px,
                ppx: p.center_x_px,
                ppy: p.center_y_px,
            });

        let distortion = match wire.distortion_parameters {
            Some(params) if !params.model.is_empty() => {
                Some(registry.resolve(&params.model, &params.parameters)?)
            }
            _ => None,
        };

        Ok(Self {
            supports_pcd: wire.supports_pcd,
            mime_types: wire.mime_types,
            intrinsics,
            distortion,
        })
    }

    /// Projector built from the intrinsics, which must be present and valid
    pub fn projector(&self) -> Result<Arc<dyn Projector>> {
        let intrinsics = self.intrinsics.ok_or_else(|| {
            CameraError::InvalidIntrinsics("camera did not report intrinsics".into())
        })?;
        intrinsics.check_valid()?;
        Ok(Arc::new(intrinsics))
    }
}
