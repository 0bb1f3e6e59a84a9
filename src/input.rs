use std::{
	convert::TryFrom,
	path::{Path, PathBuf},
};

use color_eyre::eyre::{eyre, Result};
use serde::Deserialize;
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{debug, trace};

use crate::{bound::Vertex, origin::Origin};

/// The host model's view of a site: where it is and what area it covers.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SiteInput {
	pub origin: Origin,
	pub boundary: Vec<Vertex>,
}

impl SiteInput {
	/// A square of `half_size` meters either side of the origin.
	pub fn square(origin: Origin, half_size: f64) -> Self {
		Self {
			origin,
			boundary: vec![
				Vertex { x: -half_size, y: -half_size, z: 0.0 },
				Vertex { x: half_size, y: -half_size, z: 0.0 },
				Vertex { x: half_size, y: half_size, z: 0.0 },
				Vertex { x: -half_size, y: half_size, z: 0.0 },
			],
		}
	}
}

pub async fn load_input(path: impl AsRef<Path>) -> Result<SiteInput> {
	let path: PathBuf = path.as_ref().to_owned();
	debug!(?path, "reading site input");

	let mut file = File::open(&path).await?;
	trace!(?path, ?file, "opened file");

	let bytes = usize::try_from(file.metadata().await?.len())?;
	trace!(?path, %bytes, "got file length");

	let mut contents = Vec::with_capacity(bytes);
	file.read_to_end(&mut contents).await?;
	debug!(?path, bytes=%contents.len(), "read site input file");

	let input: SiteInput = serde_json::from_slice(&contents)?;
	trace!(?path, ?input, "parsed site input");

	if input.boundary.is_empty() {
		return Err(eyre!("{}: boundary has no vertices", path.display()));
	}

	Ok(input)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reads_model_file() {
		let path = std::env::temp_dir().join(format!("site-context-input-{}.json", std::process::id()));
		tokio::fs::write(
			&path,
			r#"{
				"origin": { "latitude": 51.0, "longitude": 7.0, "elevation": 112.5 },
				"boundary": [[-50, -50, 0], [50, -50, 0], [50, 50, 0], [-50, 50, 0]]
			}"#,
		)
		.await
		.unwrap();

		let input = load_input(&path).await.unwrap();
		tokio::fs::remove_file(&path).await.ok();

		assert_eq!(input.origin, Origin::new(51.0, 7.0, 112.5));
		assert_eq!(input.boundary.len(), 4);
		assert_eq!(input.boundary[2], Vertex { x: 50.0, y: 50.0, z: 0.0 });
	}

	#[tokio::test]
	async fn missing_file() {
		assert!(load_input("/nonexistent/site.json").await.is_err());
	}

	#[test]
	fn square_boundary() {
		let input = SiteInput::square(Origin::new(51.0, 7.0, 0.0), 50.0);
		assert_eq!(input.boundary.len(), 4);
		assert_eq!(input.boundary[0], Vertex { x: -50.0, y: -50.0, z: 0.0 });
	}
}
