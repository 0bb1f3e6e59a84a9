use color_eyre::eyre::Result;
use geo::MapCoords;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::{element::Representation, site::SiteContext};

/// Elements as a GeoJSON feature collection, moved back to WGS84 lon/lat.
pub fn feature_collection(context: &SiteContext) -> Result<String> {
	let origin = context.origin;

	let features = context
		.elements
		.iter()
		.map(|element| -> Result<Feature> {
			let geometry = match &element.representation {
				Representation::Surface { polygon } => {
					Value::from(&polygon.map_coords(|c| origin.to_geographic(c)))
				}
				Representation::Curve { boundary } => {
					Value::from(&boundary.map_coords(|c| origin.to_geographic(c)))
				}
			};

			let mut properties = element
				.attributes
				.iter()
				.map(|(k, v)| (k.clone(), JsonValue::from(v)))
				.collect::<Map<_, _>>();
			properties.insert("name".into(), element.name.clone().into());
			properties.insert(
				"representation".into(),
				serde_json::to_value(element.representation.style())?,
			);
			if let Some(material) = &element.material {
				properties.insert("material".into(), material.name.clone().into());
			}

			Ok(Feature {
				bbox: None,
				geometry: Some(Geometry::new(geometry)),
				id: None,
				properties: Some(properties),
				foreign_members: None,
			})
		})
		.collect::<Result<Vec<_>>>()?;

	debug!(features=%features.len(), "built feature collection");
	Ok(GeoJson::FeatureCollection(FeatureCollection {
		bbox: None,
		features,
		foreign_members: None,
	})
	.to_string())
}
