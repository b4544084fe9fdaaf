//! Survey point records fed into the terrain engine.

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Point3};

/// Where a point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    /// Measured in the field (total station, GNSS).
    #[default]
    Survey,
    /// Sampled from a digital elevation model.
    DemSample,
    /// Derived from a feature supplied by an external spatial data service.
    IdeFeature,
    /// Entered by hand.
    Manual,
}

impl PointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Survey => "survey",
            Self::DemSample => "dem_sample",
            Self::IdeFeature => "ide_feature",
            Self::Manual => "manual",
        }
    }
}

/// Classification for point cloud returns, following the ASPRS LAS codes
/// where they exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Unclassified,
    Ground,
    Vegetation,
    Building,
    Noise,
    Water,
    Other(u8),
}

impl Classification {
    /// Maps an ASPRS numeric class.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 | 1 => Self::Unclassified,
            2 => Self::Ground,
            3..=5 => Self::Vegetation,
            6 => Self::Building,
            7 | 18 => Self::Noise,
            9 => Self::Water,
            other => Self::Other(other),
        }
    }

    /// Parses either a numeric code or a class name (English or Spanish).
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if let Ok(code) = token.parse::<u8>() {
            return Some(Self::from_code(code));
        }
        match token.to_ascii_lowercase().as_str() {
            "ground" | "terreno" | "suelo" => Some(Self::Ground),
            "vegetation" | "veg" | "vegetacion" => Some(Self::Vegetation),
            "building" | "edificio" | "construccion" => Some(Self::Building),
            "noise" | "ruido" => Some(Self::Noise),
            "water" | "agua" => Some(Self::Water),
            "unclassified" | "none" => Some(Self::Unclassified),
            _ => None,
        }
    }
}

/// 8-bit colour attached to a LiDAR return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A single 3D measurement in the local projected coordinate system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyPoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub code: Option<String>,
    pub classification: Option<Classification>,
    pub source: PointSource,
    pub intensity: Option<u16>,
    pub rgb: Option<Rgb>,
}

impl SurveyPoint {
    /// Creates a survey-sourced point without optional attributes.
    pub fn new(id: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            z,
            code: None,
            classification: None,
            source: PointSource::Survey,
            intensity: None,
            rgb: None,
        }
    }

    pub fn with_source(mut self, source: PointSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_classification(mut self, class: Classification) -> Self {
        self.classification = Some(class);
        self
    }

    pub fn position(&self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }

    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }
}
