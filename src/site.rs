use std::time::Duration;

use color_eyre::eyre::{Report, Result, WrapErr};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::{
	bound::{BoundingBox, ProjectedBbox, Vertex},
	crs::{Transformer, ETRS89_UTM32N},
	element::{Material, OutputElement, Style},
	gml::SkippedFeature,
	origin::Origin,
	wfs::{fetch_dataset, Dataset, DatasetResult, WfsClient},
};

pub const DEFAULT_ENDPOINT: &str = "https://www.wfs.nrw.de/geobasis/wfs_nw_alkis_aaa-modell-basiert";
pub const BUILDINGS: &str = "adv:AX_Gebaeude";
pub const PARCELS: &str = "adv:AX_Flurstueck";
pub const GEOMETRY_KEY: &str = "position";

/// Where and what to fetch.
#[derive(Clone, Debug)]
pub struct SiteConfig {
	pub endpoint: String,
	pub datasets: Vec<Dataset>,
	/// Name of the element holding each feature's polygon.
	pub geometry_key: String,
	/// WKT definition of the service's projected system.
	pub projection: String,
	/// Per-request timeout; `None` leaves it to the transport.
	pub timeout: Option<Duration>,
}

impl Default for SiteConfig {
	fn default() -> Self {
		Self {
			endpoint: DEFAULT_ENDPOINT.into(),
			datasets: vec![
				Dataset::new(BUILDINGS, Style::Surface),
				Dataset::new(PARCELS, Style::Curve),
			],
			geometry_key: GEOMETRY_KEY.into(),
			projection: ETRS89_UTM32N.into(),
			timeout: None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DatasetStatus {
	Fetched {
		elements: usize,
		skipped: Vec<SkippedFeature>,
	},
	Failed {
		reason: String,
	},
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetReport {
	#[serde(flatten)]
	pub dataset: Dataset,
	#[serde(flatten)]
	pub status: DatasetStatus,
}

impl DatasetReport {
	pub fn is_failed(&self) -> bool {
		matches!(self.status, DatasetStatus::Failed { .. })
	}
}

/// Everything found around one site.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SiteContext {
	pub origin: Origin,
	pub bbox: ProjectedBbox,
	pub datasets: Vec<DatasetReport>,
	pub elements: Vec<OutputElement>,
}

impl SiteContext {
	pub fn failed(&self) -> impl Iterator<Item = &DatasetReport> {
		self.datasets.iter().filter(|d| d.is_failed())
	}

	pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a OutputElement> + 'a {
		self.elements.iter().filter(move |e| e.name == name)
	}
}

/// Fetches every configured dataset around the boundary, concurrently.
///
/// An invalid projection, an empty boundary or an unusable endpoint fail the
/// whole operation. A dataset that cannot be fetched is reported in
/// [`SiteContext::datasets`] and contributes no elements; the others are
/// unaffected.
pub async fn fetch_site(config: &SiteConfig, origin: Origin, boundary: &[Vertex]) -> Result<SiteContext> {
	let bbox = BoundingBox::from_vertices(boundary)?;
	// not held across awaits: the transformer is not Sync
	let projected = {
		let transformer = Transformer::from_wkt(&config.projection).wrap_err("cannot set up coordinate transform")?;
		ProjectedBbox::from_local(&bbox, &origin, &transformer)?
	};
	let client = WfsClient::new(&config.endpoint, &config.geometry_key, config.timeout)?;

	info!(
		datasets=%config.datasets.len(),
		bbox=%projected,
		"fetching site context"
	);

	let tasks = config.datasets.iter().cloned().map(|dataset| {
		let client = client.clone();
		let projection = config.projection.clone();
		tokio::spawn(async move { fetch_dataset(&client, &dataset, &projected, &projection, &origin).await })
	});
	let results = join_all(tasks).await;

	let mut reports = Vec::with_capacity(config.datasets.len());
	let mut elements = Vec::new();
	for (dataset, joined) in config.datasets.iter().zip(results) {
		let result = joined.map_err(Report::from).and_then(|r| r);
		let status = match result {
			Ok(DatasetResult {
				elements: mut found,
				skipped,
			}) => {
				if dataset.style == Style::Surface {
					let material = Material::building();
					for element in &mut found {
						element.material = Some(material.clone());
					}
				}

				debug!(type_name=%dataset.type_name, elements=%found.len(), "merging dataset");
				let status = DatasetStatus::Fetched {
					elements: found.len(),
					skipped,
				};
				elements.extend(found);
				status
			}
			Err(err) => {
				let reason = format!("{:#}", err);
				error!(type_name=%dataset.type_name, %reason, "dataset failed");
				DatasetStatus::Failed { reason }
			}
		};

		reports.push(DatasetReport {
			dataset: dataset.clone(),
			status,
		});
	}

	let context = SiteContext {
		origin,
		bbox: projected,
		datasets: reports,
		elements,
	};
	info!(
		elements=%context.elements.len(),
		failed=%context.failed().count(),
		"fetched site context"
	);
	Ok(context)
}
