use std::str::FromStr;

use geo::{LineString, Polygon};
use geojson::{Geometry, Value as GeoJsonValue};
use serde::{Serialize, Serializer};

use crate::gml::{AttributeValue, Attributes};

/// How a dataset's polygons are represented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
	/// Filled, single-sided planar surface.
	Surface,
	/// Closed boundary outline only.
	Curve,
}

impl FromStr for Style {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"surface" | "area" => Ok(Self::Surface),
			"curve" | "outline" => Ok(Self::Curve),
			_ => Err(format!("unknown geometry style: {}", s)),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Representation {
	Surface {
		#[serde(serialize_with = "geojson_ser")]
		polygon: Polygon<f64>,
	},
	Curve {
		#[serde(serialize_with = "geojson_ser")]
		boundary: LineString<f64>,
	},
}

impl Representation {
	pub fn style(&self) -> Style {
		match self {
			Self::Surface { .. } => Style::Surface,
			Self::Curve { .. } => Style::Curve,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Color {
	pub red: f64,
	pub green: f64,
	pub blue: f64,
	pub alpha: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Material {
	pub name: String,
	pub color: Color,
}

impl Material {
	/// Pale grey used to set building footprints apart from parcels.
	pub fn building() -> Self {
		Self {
			name: "Building".into(),
			color: Color {
				red: 0.7,
				green: 0.7,
				blue: 0.7,
				alpha: 1.0,
			},
		}
	}
}

/// A geometric element in the local frame, named after its dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutputElement {
	pub name: String,
	pub representation: Representation,
	pub attributes: Attributes,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub material: Option<Material>,
}

impl OutputElement {
	pub fn assemble(type_name: &str, polygon: Polygon<f64>, style: Style, attributes: Attributes) -> Self {
		let representation = match style {
			Style::Surface => Representation::Surface { polygon },
			Style::Curve => {
				let (boundary, _) = polygon.into_inner();
				Representation::Curve { boundary }
			}
		};

		Self {
			name: type_name.to_string(),
			representation,
			attributes,
			material: None,
		}
	}

	pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
		self.attributes.get(key)
	}
}

fn geojson_ser<S, G>(geometry: &G, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
	for<'a> GeoJsonValue: From<&'a G>,
{
	Geometry::new(GeoJsonValue::from(geometry)).serialize(serializer)
}
