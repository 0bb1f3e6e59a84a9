use std::{env::var, path::PathBuf, time::Duration};

use color_eyre::eyre::{eyre, Result};
use structopt::StructOpt;
use tracing::{debug, info, warn};

use site_context::{
	element::Style,
	fetch_site,
	input::{load_input, SiteInput},
	output::{render, OutputFormat},
	wfs::Dataset,
	Origin, SiteConfig, Vertex,
};

#[derive(Clone, Debug, StructOpt)]
struct Args {
	#[structopt(short, parse(from_occurrences))]
	verbose: u8,

	#[structopt(short, long)]
	quiet: bool,

	/// JSON file with the site's origin and boundary vertices
	#[structopt(long, conflicts_with_all = &["latitude", "longitude", "vertex"])]
	input: Option<PathBuf>,

	#[structopt(long, allow_hyphen_values = true, required_unless = "input")]
	latitude: Option<f64>,

	#[structopt(long, allow_hyphen_values = true, required_unless = "input")]
	longitude: Option<f64>,

	#[structopt(long, allow_hyphen_values = true, default_value = "0")]
	elevation: f64,

	/// Boundary vertex in local meters, as x,y or x,y,z
	#[structopt(long = "vertex", allow_hyphen_values = true, number_of_values = 1)]
	vertex: Vec<Vertex>,

	/// Half the side of a square boundary around the origin, used without --vertex
	#[structopt(long, default_value = "50")]
	half_size: f64,

	#[structopt(long, default_value = "https://www.wfs.nrw.de/geobasis/wfs_nw_alkis_aaa-modell-basiert")]
	endpoint: String,

	/// Feature type of the buildings, which get the building material when drawn as surfaces
	#[structopt(long, default_value = "adv:AX_Gebaeude")]
	buildings: String,

	/// How the buildings are drawn: surface (area) or curve (outline)
	#[structopt(long, default_value = "surface")]
	buildings_style: Style,

	/// Feature type of the parcels
	#[structopt(long, default_value = "adv:AX_Flurstueck")]
	parcels: String,

	/// How the parcels are drawn: surface (area) or curve (outline)
	#[structopt(long, default_value = "curve")]
	parcels_style: Style,

	#[structopt(long, default_value = "position")]
	geometry_key: String,

	/// WKT (.prj) file of the service's projected system, instead of ETRS89 / UTM 32N
	#[structopt(long)]
	projection: Option<PathBuf>,

	/// Request timeout in seconds
	#[structopt(long)]
	timeout: Option<u64>,

	#[structopt(long, default_value = "text")]
	output: OutputFormat,

	/// Exit successfully even if a dataset could not be fetched
	#[structopt(long)]
	allow_partial: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	if var("RUST_LOG").is_ok() {
		tracing_subscriber::fmt()
			.with_writer(std::io::stderr)
			.init();
	}

	let args = Args::from_args();

	if !args.quiet {
		tracing_subscriber::fmt()
			.with_writer(std::io::stderr)
			.with_env_filter(match args.verbose {
				0 => "site_context=info",
				1 => "site_context=debug",
				2 => "site_context=trace",
				3.. => "trace",
			})
			.try_init()
			.ok();
	}

	debug!(?args, "parsed arguments");

	let site = match &args.input {
		Some(path) => load_input(path).await?,
		None => {
			let origin = Origin::new(
				args.latitude.ok_or_else(|| eyre!("--latitude is required"))?,
				args.longitude.ok_or_else(|| eyre!("--longitude is required"))?,
				args.elevation,
			);
			if args.vertex.is_empty() {
				SiteInput::square(origin, args.half_size)
			} else {
				SiteInput {
					origin,
					boundary: args.vertex.clone(),
				}
			}
		}
	};
	info!(origin=?site.origin, vertices=%site.boundary.len(), "loaded site");

	let mut config = SiteConfig {
		endpoint: args.endpoint.clone(),
		datasets: vec![
			Dataset::new(args.buildings.clone(), args.buildings_style),
			Dataset::new(args.parcels.clone(), args.parcels_style),
		],
		geometry_key: args.geometry_key.clone(),
		timeout: args.timeout.map(Duration::from_secs),
		..SiteConfig::default()
	};
	if let Some(path) = &args.projection {
		debug!(?path, "reading projection definition");
		config.projection = tokio::fs::read_to_string(path).await?;
	}

	let context = fetch_site(&config, site.origin, &site.boundary).await?;
	println!("{}", render(&context, args.output)?);

	let failed = context
		.failed()
		.map(|d| d.dataset.type_name.as_str())
		.collect::<Vec<_>>();
	if failed.is_empty() {
		return Ok(());
	}

	if args.allow_partial {
		warn!(?failed, "some datasets could not be fetched");
		Ok(())
	} else {
		Err(eyre!("failed to fetch {}", failed.join(", ")))
	}
}
