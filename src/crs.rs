use std::fmt;

use color_eyre::eyre::{eyre, Result, WrapErr};
use geo::Coord;
use proj::{Proj, ProjError};
use tracing::debug;

/// ETRS89 / UTM zone 32N, the grid used by the German state cadastres.
pub const ETRS89_UTM32N: &str = r#"PROJCS["ETRS89 / UTM zone 32N",GEOGCS["ETRS89",DATUM["European_Terrestrial_Reference_System_1989",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],TOWGS84[0,0,0,0,0,0,0],AUTHORITY["EPSG","6258"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4258"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",9],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],AXIS["Northing",NORTH],AUTHORITY["EPSG","25832"]]"#;

const WGS84: &str = "EPSG:4326";

/// Transforms between one projected system and geographic WGS84.
///
/// Geographic coordinates are `Coord { x: lon, y: lat }` in degrees.
pub struct Transformer {
	name: String,
	epsg: u32,
	to_geographic: Proj,
	to_projected: Proj,
}

impl Transformer {
	/// Accepts a WKT definition (as found in `.prj` files) or an `EPSG:<code>`
	/// reference. The EPSG code of the system must be known, since it names
	/// the system in requests.
	pub fn from_wkt(definition: &str) -> Result<Self> {
		let name = crs_name(definition);
		let epsg = epsg_code(definition).ok_or_else(|| eyre!("{}: missing EPSG authority", name))?;

		let to_geographic = Proj::new_known_crs(definition, WGS84, None)
			.wrap_err_with(|| format!("{}: unusable projection definition", name))?;
		let to_projected = Proj::new_known_crs(WGS84, definition, None)
			.wrap_err_with(|| format!("{}: unusable projection definition", name))?;

		debug!(%name, %epsg, "constructed coordinate transformer");
		Ok(Self {
			name,
			epsg,
			to_geographic,
			to_projected,
		})
	}

	pub fn etrs89_utm32n() -> Result<Self> {
		Self::from_wkt(ETRS89_UTM32N)
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn epsg(&self) -> u32 {
		self.epsg
	}

	/// Projected (easting, northing) to geographic (lon, lat).
	pub fn to_geographic(&self, projected: Coord) -> Result<Coord, ProjError> {
		let (x, y) = self.to_geographic.convert((projected.x, projected.y))?;
		Ok(Coord { x, y })
	}

	/// Geographic (lon, lat) to projected (easting, northing).
	pub fn to_projected(&self, geographic: Coord) -> Result<Coord, ProjError> {
		let (x, y) = self.to_projected.convert((geographic.x, geographic.y))?;
		Ok(Coord { x, y })
	}
}

impl fmt::Debug for Transformer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Transformer")
			.field("name", &self.name)
			.field("epsg", &self.epsg)
			.finish()
	}
}

/// The quoted name of the root node, or the definition itself.
fn crs_name(definition: &str) -> String {
	let definition = definition.trim();
	definition
		.split_once('[')
		.and_then(|(_, rest)| rest.strip_prefix('"'))
		.and_then(|rest| rest.split_once('"'))
		.map_or(definition, |(name, _)| name)
		.to_string()
}

/// EPSG code of the root system: from an `EPSG:<code>` reference, or from the
/// `AUTHORITY`/`ID` node closing a WKT definition.
fn epsg_code(definition: &str) -> Option<u32> {
	let definition = definition.trim();
	let upper = definition.to_ascii_uppercase();
	if let Some(code) = upper.strip_prefix("EPSG:") {
		return code.trim().parse().ok();
	}

	// the root's identifier is its last child, so it must close right before the root does
	let body = definition.strip_suffix(']')?;
	let start = body.rfind("AUTHORITY[").or_else(|| body.rfind("ID["))?;
	let (_, ident) = body[start..].split_once('[')?;
	let (authority, code) = ident.strip_suffix(']')?.split_once(',')?;

	if !authority.trim().trim_matches('"').eq_ignore_ascii_case("EPSG") {
		return None;
	}
	code.trim().trim_matches('"').parse().ok()
}
