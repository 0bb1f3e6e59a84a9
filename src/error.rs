use serde::Serialize;
use thiserror::Error;

/// Why a single feature was dropped from a dataset.
#[derive(Error, Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureError {
	#[error("missing <{name}> in <{parent}>")]
	MissingElement { parent: String, name: String },

	#[error("coordinate list has {values} values, not a multiple of 3")]
	MalformedPosList { values: usize },

	#[error("invalid coordinate {token:?}")]
	InvalidNumber { token: String },

	#[error("polygon has {distinct} distinct vertices, need at least 3")]
	TooFewVertices { distinct: usize },

	#[error("polygon is degenerate (area {area} m²)")]
	ZeroArea { area: f64 },

	#[error("cannot transform vertex: {message}")]
	Projection { message: String },
}
