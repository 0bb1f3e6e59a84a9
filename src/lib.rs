//! Fetches building footprints and parcel boundaries around a site from a
//! WFS 2.0 service and brings them into the site's local frame.

pub mod bound;
pub mod crs;
pub mod element;
pub mod error;
pub mod geometry;
pub mod gml;
pub mod input;
pub mod origin;
pub mod output;
pub mod site;
pub mod wfs;

pub use bound::Vertex;
pub use element::{OutputElement, Representation, Style};
pub use origin::Origin;
pub use site::{fetch_site, DatasetReport, DatasetStatus, SiteConfig, SiteContext};
