use geo::{Area, Coord, LineString, Polygon};
use tracing::trace;

use crate::{crs::Transformer, error::FeatureError, origin::Origin};

/// Rings enclosing less than this, in square projected units, are degenerate.
const MIN_AREA: f64 = 1e-6;

/// Turns a ring of projected (x, y, z) triples into a closed polygon in local
/// meters. Heights are dropped: the polygon lies in the plane of the origin.
pub fn build_polygon(
	ring: &[[f64; 3]],
	transformer: &Transformer,
	origin: &Origin,
) -> Result<Polygon<f64>, FeatureError> {
	let mut projected = ring
		.iter()
		.map(|&[x, y, _]| Coord { x, y })
		.collect::<Vec<_>>();

	if let Some(c) = projected.iter().find(|c| !c.x.is_finite() || !c.y.is_finite()) {
		return Err(FeatureError::InvalidNumber {
			token: format!("{} {}", c.x, c.y),
		});
	}

	projected.dedup();
	if projected.len() > 1 && projected.first() == projected.last() {
		projected.pop();
	}

	if projected.len() < 3 {
		return Err(FeatureError::TooFewVertices {
			distinct: projected.len(),
		});
	}

	// collinear rings have no area in the projected plane already; measure
	// relative to the first vertex to keep precision at grid magnitudes
	let first = projected[0];
	let relative = projected.iter().map(|&c| c - first).collect::<Vec<_>>();
	let area = Polygon::new(LineString::from(relative), Vec::new()).unsigned_area();
	// NaN compares false
	if !(area >= MIN_AREA) {
		return Err(FeatureError::ZeroArea { area });
	}

	let local = projected
		.into_iter()
		.map(|c| {
			transformer
				.to_geographic(c)
				.map(|g| origin.to_local(g))
				.map_err(|err| FeatureError::Projection {
					message: err.to_string(),
				})
		})
		.collect::<Result<Vec<_>, _>>()?;
	trace!(vertices=%local.len(), %area, "built polygon");

	Ok(Polygon::new(LineString::from(local), Vec::new()))
}
