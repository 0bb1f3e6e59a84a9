use std::{fmt, time::Duration};

use color_eyre::eyre::{eyre, Result, WrapErr};
use itertools::Itertools;
use mime::Mime;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
	bound::ProjectedBbox,
	crs::Transformer,
	element::{OutputElement, Style},
	geometry::build_polygon,
	gml::{self, FeatureBatch, SkippedFeature},
	origin::Origin,
};

/// A feature type to request, and how its polygons are represented.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dataset {
	pub type_name: String,
	pub style: Style,
}

impl Dataset {
	pub fn new(type_name: impl Into<String>, style: Style) -> Self {
		Self {
			type_name: type_name.into(),
			style,
		}
	}
}

/// Elements built from one dataset, plus the features that didn't make it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetResult {
	pub elements: Vec<OutputElement>,
	pub skipped: Vec<SkippedFeature>,
}

/// Issues WFS 2.0 `GetFeature` requests against one endpoint.
#[derive(Clone, Debug)]
pub struct WfsClient {
	http: Client,
	endpoint: Url,
	geometry_key: String,
}

impl WfsClient {
	pub fn new(endpoint: &str, geometry_key: &str, timeout: Option<Duration>) -> Result<Self> {
		let endpoint = Url::parse(endpoint).wrap_err_with(|| format!("invalid endpoint {:?}", endpoint))?;

		let mut builder = Client::builder().user_agent(concat!(
			env!("CARGO_PKG_NAME"),
			"/",
			env!("CARGO_PKG_VERSION")
		));
		if let Some(timeout) = timeout {
			builder = builder.timeout(timeout);
		}

		Ok(Self {
			http: builder.build()?,
			endpoint,
			geometry_key: geometry_key.to_string(),
		})
	}

	pub fn get_feature_url(&self, type_name: &str, bbox: &ProjectedBbox) -> Url {
		let mut url = self.endpoint.clone();
		url.query_pairs_mut()
			.append_pair("VERSION", "2.0.0")
			.append_pair("SERVICE", "WFS")
			.append_pair("REQUEST", "GetFeature")
			.append_pair("TYPENAMES", type_name)
			.append_pair("BBOX", &bbox.to_string());
		url
	}

	pub async fn fetch_body(&self, type_name: &str, bbox: &ProjectedBbox) -> Result<String> {
		let url = self.get_feature_url(type_name, bbox);
		info!(%type_name, %url, "fetching features");

		let resp = self.http.get(url).send().await?;
		let status = resp.status();
		if !status.is_success() {
			debug!(%type_name, %status, "service refused request");
			let body = resp.text().await.unwrap_or_default();
			return Err(match ExceptionReport::from_body(&body) {
				Some(report) => eyre!("{} from service: {}", status, report),
				None => eyre!("{} from service", status),
			});
		}

		let content_type = resp
			.headers()
			.get(CONTENT_TYPE)
			.map(|v| v.to_str())
			.transpose()?
			.unwrap_or("?")
			.to_string();

		info!(
			%type_name,
			bytes=%resp.content_length().unwrap_or(0),
			%content_type,
			"got feature collection"
		);
		trace!(%type_name, status=?status, headers=?resp.headers(), "headers");

		match content_type.parse::<Mime>() {
			Ok(media_type) if is_xml(&media_type) => {
				trace!(%type_name, ?media_type, "decoded media type");
			}
			_ => warn!(%type_name, %content_type, "unexpected media type, trying xml"),
		}

		let body = resp.text().await?;
		debug!(%type_name, chars=%body.chars().count(), "decoded body as text");
		trace!(%type_name, body=%body, "decoded body");

		Ok(body)
	}

	pub fn parse(&self, type_name: &str, body: &str) -> Result<FeatureBatch> {
		gml::parse_features(body, type_name, &self.geometry_key).map_err(|err| {
			match ExceptionReport::from_body(body) {
				Some(report) => eyre!("service exception: {}", report),
				None => err.wrap_err("unreadable feature collection"),
			}
		})
	}
}

fn is_xml(media_type: &Mime) -> bool {
	media_type.subtype().as_str() == "xml" || media_type.suffix().map(|s| s.as_str()) == Some("xml")
}

/// Fetches one dataset and turns its features into elements.
///
/// Errors are about the dataset as a whole: the request failed, or the
/// response was not a feature collection. Individual features that cannot
/// be read or built are collected in [`DatasetResult::skipped`].
///
/// `projection` is the definition of the service's system. The transformer is
/// built once the response is in, and is not shared between tasks.
pub async fn fetch_dataset(
	client: &WfsClient,
	dataset: &Dataset,
	bbox: &ProjectedBbox,
	projection: &str,
	origin: &Origin,
) -> Result<DatasetResult> {
	let body = client.fetch_body(&dataset.type_name, bbox).await?;
	let batch = client.parse(&dataset.type_name, &body)?;
	let transformer = Transformer::from_wkt(projection)?;
	Ok(assemble_dataset(dataset, batch, &transformer, origin))
}

/// Builds elements from parsed features, adding the ones that fail to the skips.
pub fn assemble_dataset(
	dataset: &Dataset,
	batch: FeatureBatch,
	transformer: &Transformer,
	origin: &Origin,
) -> DatasetResult {
	let type_name = dataset.type_name.as_str();
	let mut skipped = batch.skipped;
	let mut elements = Vec::with_capacity(batch.features.len());
	for feature in batch.features {
		match build_polygon(&feature.ring, transformer, origin) {
			Ok(polygon) => elements.push(OutputElement::assemble(
				type_name,
				polygon,
				dataset.style,
				feature.attributes,
			)),
			Err(reason) => {
				debug!(%type_name, index=%feature.index, id=?feature.id, %reason, "skipping feature");
				skipped.push(SkippedFeature {
					index: feature.index,
					id: feature.id,
					reason,
				});
			}
		}
	}
	skipped.sort_by_key(|s| s.index);

	if !skipped.is_empty() {
		warn!(%type_name, skipped=%skipped.len(), "dropped unreadable features");
	}
	info!(%type_name, elements=%elements.len(), style=?dataset.style, "assembled dataset");

	DatasetResult { elements, skipped }
}

/// An OWS exception report, as sent in place of a feature collection.
#[derive(Clone, Debug, Deserialize)]
pub struct ExceptionReport {
	#[serde(rename = "Exception", default)]
	pub exceptions: Vec<Exception>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Exception {
	#[serde(rename = "exceptionCode", default)]
	pub code: String,

	#[serde(default)]
	pub locator: String,

	#[serde(rename = "ExceptionText", default)]
	pub texts: Vec<String>,
}

impl ExceptionReport {
	pub fn from_body(body: &str) -> Option<Self> {
		let root = gml::parse_document(body).ok()?;
		if root.local_name() != "ExceptionReport" {
			return None;
		}

		match serde_xml_rs::from_str::<Self>(body) {
			Ok(report) => {
				trace!(?report, "parsed exception report");
				Some(report)
			}
			Err(err) => {
				warn!(%err, "failed to decode exception report");
				None
			}
		}
	}
}

impl fmt::Display for ExceptionReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.exceptions.is_empty() {
			return write!(f, "empty exception report");
		}

		let text = self
			.exceptions
			.iter()
			.map(|e| {
				let mut s = e.code.clone();
				if !e.locator.is_empty() {
					s.push_str(&format!(" ({})", e.locator));
				}
				if !e.texts.is_empty() {
					s.push_str(": ");
					s.push_str(&e.texts.iter().map(|t| t.trim()).join(" "));
				}
				s
			})
			.join("; ");
		write!(f, "{}", text)
	}
}
