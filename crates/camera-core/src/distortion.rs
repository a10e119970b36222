//! Lens distortion models
//!
//! Models are looked up by name in a [`DistortionRegistry`], which maps each
//! model name to a factory taking the wire parameter list. Unknown names and
//! rejected parameters both fail resolution.

use crate::error::{CameraError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Model name for Brown-Conrady distortion
pub const BROWN_CONRADY: &str = "brown_conrady";
/// Model name for Kannala-Brandt (fisheye) distortion
pub const KANNALA_BRANDT: &str = "kannala_brandt";

/// A named lens distortion model
pub trait Distorter: fmt::Debug + Send + Sync {
    /// Registry name of the model
    fn model(&self) -> &str;

    /// Parameters in wire order
    fn parameters(&self) -> Vec<f64>;

    /// Apply the distortion to a normalized image point
    fn transform(&self, x: f64, y: f64) -> (f64, f64);
}

/// Builds a distortion model from its wire parameters
pub type DistorterFactory = Arc<dyn Fn(&[f64]) -> Result<Arc<dyn Distorter>> + Send + Sync>;

/// Name → factory lookup for distortion models
#[derive(Clone)]
pub struct DistortionRegistry {
    factories: HashMap<String, DistorterFactory>,
}

impl DistortionRegistry {
    /// Registry with no models
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) a model factory
    pub fn register<F>(&mut self, model: &str, factory: F)
    where
        F: Fn(&[f64]) -> Result<Arc<dyn Distorter>> + Send + Sync + 'static,
    {
        self.factories.insert(model.to_string(), Arc::new(factory));
    }

    /// Whether a model name is known
    pub fn contains(&self, model: &str) -> bool {
        self.factories.contains_key(model)
    }

    /// Construct the named model from its parameters
    pub fn resolve(&self, model: &str, parameters: &[f64]) -> Result<Arc<dyn Distorter>> {
        let factory =
            self.factories
                .get(model)
                .ok_or_else(|| CameraError::UnresolvedDistortionModel {
                    model: model.to_string(),
                    reason: "no such model".into(),
                })?;
        if let Some(bad) = parameters.iter().find(|p| !p.is_finite()) {
            return Err(CameraError::UnresolvedDistortionModel {
                model: model.to_string(),
                reason: format!("parameter {} is not finite", bad),
            });
        }
        factory(parameters)
    }
}

impl Default for DistortionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(BROWN_CONRADY, |params| {
            Ok(Arc::new(BrownConrady::from_parameters(params)?) as Arc<dyn Distorter>)
        });
        registry.register(KANNALA_BRANDT, |params| {
            Ok(Arc::new(KannalaBrandt::from_parameters(params)?) as Arc<dyn Distorter>)
        });
        registry
    }
}

impl fmt::Debug for DistortionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut models: Vec<&String> = self.factories.keys().collect();
        models.sort();
        f.debug_struct("DistortionRegistry")
            .field("models", &models)
            .finish()
    }
}

/// Copy up to `N` parameters, zero-filling the rest
fn fixed_params<const N: usize>(model: &str, params: &[f64]) -> Result<[f64; N]> {
    if params.len() > N {
        return Err(CameraError::UnresolvedDistortionModel {
            model: model.to_string(),
            reason: format!(
                "list of parameters too long, expected max {}, got {}",
                N,
                params.len()
            ),
        });
    }
    let mut out = [0.0; N];
    out[..params.len()].copy_from_slice(params);
    Ok(out)
}

/// Radial + tangential distortion: `[k1, k2, k3, p1, p2]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrownConrady {
    pub radial_k1: f64,
    pub radial_k2: f64,
    pub radial_k3: f64,
    pub tangential_p1: f64,
    pub tangential_p2: f64,
}

impl BrownConrady {
    pub fn from_parameters(params: &[f64]) -> Result<Self> {
        let [k1, k2, k3, p1, p2] = fixed_params::<5>(BROWN_CONRADY, params)?;
        Ok(Self {
            radial_k1: k1,
            radial_k2: k2,
            radial_k3: k3,
            tangential_p1: p1,
            tangential_p2: p2,
        })
    }
}

impl Distorter for BrownConrady {
    fn model(&self) -> &str {
        BROWN_CONRADY
    }

    fn parameters(&self) -> Vec<f64> {
        vec![
            self.radial_k1,
            self.radial_k2,
            self.radial_k3,
            self.tangential_p1,
            self.tangential_p2,
        ]
    }

    fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let radial =
            1.0 + self.radial_k1 * r2 + self.radial_k2 * r2 * r2 + self.radial_k3 * r2 * r2 * r2;
        let dx = 2.0 * self.tangential_p1 * x * y + self.tangential_p2 * (r2 + 2.0 * x * x);
        let dy = 2.0 * self.tangential_p2 * x * y + self.tangential_p1 * (r2 + 2.0 * y * y);
        (x * radial + dx, y * radial + dy)
    }
}

/// Equidistant fisheye distortion: `[k1, k2, k3, k4]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KannalaBrandt {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
}

impl KannalaBrandt {
    pub fn from_parameters(params: &[f64]) -> Result<Self> {
        let [k1, k2, k3, k4] = fixed_params::<4>(KANNALA_BRANDT, params)?;
        Ok(Self { k1, k2, k3, k4 })
    }
}

impl Distorter for KannalaBrandt {
    fn model(&self) -> &str {
        KANNALA_BRANDT
    }

    fn parameters(&self) -> Vec<f64> {
        vec![self.k1, self.k2, self.k3, self.k4]
    }

    fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let r = (x * x + y * y).sqrt();
        if r == 0.0 {
            return (x, y);
        }
        let theta = r.atan();
        let t2 = theta * theta;
        let theta_d =
            theta * (1.0 + self.k1 * t2 + self.k2 * t2 * t2 + self.k3 * t2.powi(3) + self.k4 * t2.powi(4));
        let scale = theta_d / r;
        (x * scale, y * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_models() {
        let registry = DistortionRegistry::default();
        assert!(registry.contains(BROWN_CONRADY));
        assert!(registry.contains(KANNALA_BRANDT));

        let model = registry
            .resolve(BROWN_CONRADY, &[0.1, 0.01, 0.001])
            .unwrap();
        assert_eq!(model.model(), BROWN_CONRADY);
        assert_eq!(model.parameters(), vec![0.1, 0.01, 0.001, 0.0, 0.0]);
    }

    #[test]
    fn test_unknown_model() {
        let registry = DistortionRegistry::default();
        match registry.resolve("unknown", &[]) {
            Err(CameraError::UnresolvedDistortionModel { model, .. }) => {
                assert_eq!(model, "unknown")
            }
            other => panic!("Expected UnresolvedDistortionModel, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_parameters() {
        let registry = DistortionRegistry::default();
        assert!(matches!(
            registry.resolve(KANNALA_BRANDT, &[0.0; 5]),
            Err(CameraError::UnresolvedDistortionModel { .. })
        ));
        assert!(matches!(
            registry.resolve(BROWN_CONRADY, &[f64::INFINITY]),
            Err(CameraError::UnresolvedDistortionModel { .. })
        ));
    }

    #[test]
    fn test_custom_model_registration() {
        #[derive(Debug)]
        struct Identity;
        impl Distorter for Identity {
            fn model(&self) -> &str {
                "identity"
            }
            fn parameters(&self) -> Vec<f64> {
                vec![]
            }
            fn transform(&self, x: f64, y: f64) -> (f64, f64) {
                (x, y)
            }
        }

        let mut registry = DistortionRegistry::empty();
        assert!(registry.resolve(BROWN_CONRADY, &[]).is_err());
        registry.register("identity", |_| Ok(Arc::new(Identity) as Arc<dyn Distorter>));
        let model = registry.resolve("identity", &[]).unwrap();
        assert_eq!(model.transform(0.3, -0.2), (0.3, -0.2));
    }

    #[test]
    fn test_transforms() {
        let none = BrownConrady::from_parameters(&[]).unwrap();
        assert_eq!(none.transform(0.25, 0.5), (0.25, 0.5));

        let barrel = BrownConrady::from_parameters(&[-0.2]).unwrap();
        let (x, _) = barrel.transform(0.5, 0.0);
        assert!((x - 0.475).abs() < 1e-12);

        let fisheye = KannalaBrandt::from_parameters(&[]).unwrap();
        let (x, y) = fisheye.transform(1.0, 0.0);
        assert!((x - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert_eq!(y, 0.0);
        assert_eq!(fisheye.transform(0.0, 0.0), (0.0, 0.0));
    }
}
