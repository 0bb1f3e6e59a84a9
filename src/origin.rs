use cheap_ruler::{CheapRuler, DistanceUnit};
use geo::{Coord, Point};
use serde::{Deserialize, Serialize};

/// Geographic anchor of the local project frame.
///
/// Local coordinates are meters east (`x`) and north (`y`) of the origin, on
/// a plane tangent at the origin. The plane sits at `elevation`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct Origin {
	pub latitude: f64,
	pub longitude: f64,
	#[serde(default)]
	pub elevation: f64,
}

impl Origin {
	pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
		Self {
			latitude,
			longitude,
			elevation,
		}
	}

	fn ruler(&self) -> CheapRuler<f64> {
		CheapRuler::new(self.latitude, DistanceUnit::Meters)
	}

	fn point(&self) -> Point<f64> {
		Point::new(self.longitude, self.latitude)
	}

	/// Local meters to geographic (lon, lat).
	pub fn to_geographic(&self, local: Coord) -> Coord {
		self.ruler().offset(&self.point(), local.x, local.y).into()
	}

	/// Geographic (lon, lat) to local meters.
	pub fn to_local(&self, geographic: Coord) -> Coord {
		let ruler = self.ruler();
		let target = Point::from(geographic);
		let distance = ruler.distance(&self.point(), &target);
		let bearing = ruler.bearing(&self.point(), &target).to_radians();
		Coord {
			x: distance * bearing.sin(),
			y: distance * bearing.cos(),
		}
	}
}
