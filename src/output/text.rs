use std::fmt::Write;

use color_eyre::eyre::Result;
use itertools::Itertools;

use crate::site::{DatasetStatus, SiteContext};

pub fn text(context: &SiteContext) -> Result<String> {
	let mut message = String::with_capacity(256 + context.elements.len() * 16);

	writeln!(
		message,
		"site at {:.6}, {:.6} (elevation {} m)",
		context.origin.latitude, context.origin.longitude, context.origin.elevation
	)?;
	writeln!(message, "bbox {}", context.bbox)?;

	for report in &context.datasets {
		let dataset = &report.dataset;
		match &report.status {
			DatasetStatus::Fetched { elements, skipped } => {
				writeln!(
					message,
					"\n{} [{:?}]: {} elements, {} skipped",
					dataset.type_name,
					dataset.style,
					elements,
					skipped.len()
				)?;
				for skip in skipped {
					writeln!(
						message,
						"  #{} {}: {}",
						skip.index,
						skip.id.as_deref().unwrap_or("-"),
						skip.reason
					)?;
				}
			}
			DatasetStatus::Failed { reason } => {
				writeln!(
					message,
					"\n{} [{:?}]: FAILED: {}",
					dataset.type_name, dataset.style, reason
				)?;
			}
		}
	}

	let materials = context
		.elements
		.iter()
		.filter_map(|e| e.material.as_ref().map(|m| m.name.as_str()))
		.counts();
	if !materials.is_empty() {
		writeln!(
			message,
			"\nmaterials: {}",
			materials
				.iter()
				.sorted()
				.map(|(name, n)| format!("{} x{}", name, n))
				.join(", ")
		)?;
	}

	Ok(message.trim().into())
}
