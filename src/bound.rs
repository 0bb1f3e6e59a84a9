use std::fmt;

use color_eyre::eyre::{eyre, Result, WrapErr};
use geo::Coord;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{crs::Transformer, origin::Origin};

/// A vertex of the region of interest, in local meters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vertex {
	pub x: f64,
	pub y: f64,
	pub z: f64,
}

impl From<[f64; 3]> for Vertex {
	fn from([x, y, z]: [f64; 3]) -> Self {
		Self { x, y, z }
	}
}

impl From<Vertex> for [f64; 3] {
	fn from(v: Vertex) -> Self {
		[v.x, v.y, v.z]
	}
}

impl std::str::FromStr for Vertex {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let parts = s
			.split(',')
			.map(|p| p.trim().parse::<f64>())
			.collect::<Result<Vec<_>, _>>()
			.map_err(|err| format!("invalid vertex {:?}: {}", s, err))?;

		match parts[..] {
			[x, y] => Ok(Self { x, y, z: 0.0 }),
			[x, y, z] => Ok(Self { x, y, z }),
			_ => Err(format!("invalid vertex {:?}: expected x,y or x,y,z", s)),
		}
	}
}

/// Axis-aligned box in local meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
	pub min: Vertex,
	pub max: Vertex,
}

impl BoundingBox {
	pub fn from_vertices(vertices: &[Vertex]) -> Result<Self> {
		let (first, rest) = vertices
			.split_first()
			.ok_or_else(|| eyre!("boundary has no vertices"))?;

		let mut bbox = Self {
			min: *first,
			max: *first,
		};
		for v in rest {
			bbox.min.x = bbox.min.x.min(v.x);
			bbox.min.y = bbox.min.y.min(v.y);
			bbox.min.z = bbox.min.z.min(v.z);
			bbox.max.x = bbox.max.x.max(v.x);
			bbox.max.y = bbox.max.y.max(v.y);
			bbox.max.z = bbox.max.z.max(v.z);
		}

		trace!(?bbox, "computed local bounding box");
		Ok(bbox)
	}

	pub fn is_degenerate(&self) -> bool {
		self.min == self.max
	}

	fn footprint(&self) -> [Coord; 4] {
		[
			Coord { x: self.min.x, y: self.min.y },
			Coord { x: self.max.x, y: self.min.y },
			Coord { x: self.max.x, y: self.max.y },
			Coord { x: self.min.x, y: self.max.y },
		]
	}
}

/// A bounding box in the units of a projected system, tagged with its EPSG code.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProjectedBbox {
	pub min_x: f64,
	pub min_y: f64,
	pub max_x: f64,
	pub max_y: f64,
	pub epsg: u32,
}

impl ProjectedBbox {
	/// Projects a local box through the origin into the transformer's system.
	///
	/// All four footprint corners are projected and enveloped, so the result
	/// covers the box even where grid north and true north diverge.
	pub fn from_local(bbox: &BoundingBox, origin: &Origin, transformer: &Transformer) -> Result<Self> {
		let corners = bbox
			.footprint()
			.iter()
			.map(|&c| transformer.to_projected(origin.to_geographic(c)))
			.collect::<Result<Vec<_>, _>>()
			.wrap_err_with(|| format!("cannot project bounding box into {}", transformer.name()))?;

		let (min_x, max_x) = corners
			.iter()
			.map(|c| c.x)
			.minmax_by(f64::total_cmp)
			.into_option()
			.unwrap_or_default();
		let (min_y, max_y) = corners
			.iter()
			.map(|c| c.y)
			.minmax_by(f64::total_cmp)
			.into_option()
			.unwrap_or_default();

		let projected = Self {
			min_x,
			min_y,
			max_x,
			max_y,
			epsg: transformer.epsg(),
		};
		debug!(%projected, degenerate=%bbox.is_degenerate(), "translated bounding box");
		Ok(projected)
	}

	pub fn crs_urn(&self) -> String {
		format!("urn:ogc:def:crs:EPSG::{}", self.epsg)
	}
}

/// Renders as the value of a WFS 2.0 `BBOX` parameter.
impl fmt::Display for ProjectedBbox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{},{},{},{},{}",
			self.min_x,
			self.min_y,
			self.max_x,
			self.max_y,
			self.crs_urn()
		)
	}
}
