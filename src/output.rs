use std::str::FromStr;

use color_eyre::eyre::Result;

use crate::site::SiteContext;

pub use features::feature_collection;
pub use text::text;

mod features;
mod text;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
	Json,
	GeoJson,
	Text,
}

impl FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"json" => Ok(Self::Json),
			"geojson" => Ok(Self::GeoJson),
			"text" => Ok(Self::Text),
			_ => Err(format!("unknown output type: {}", s)),
		}
	}
}

pub fn render(context: &SiteContext, format: OutputFormat) -> Result<String> {
	match format {
		OutputFormat::Json => Ok(serde_json::to_string_pretty(context)?),
		OutputFormat::GeoJson => feature_collection(context),
		OutputFormat::Text => text(context),
	}
}
