use std::collections::BTreeMap;

use color_eyre::eyre::{eyre, Result};
use itertools::Itertools;
use quick_xml::{
	events::{BytesStart, Event},
	Reader,
};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::FeatureError;

/// An XML element with its qualified name, attributes, children and text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
	pub name: String,
	pub attributes: Vec<(String, String)>,
	pub children: Vec<Element>,
	pub text: String,
}

/// Whether the qualified `name` answers to `query`.
///
/// A prefixed query (`gml:posList`) must match exactly; an unprefixed one
/// (`position`) matches on the local part, whatever the prefix.
fn name_matches(name: &str, query: &str) -> bool {
	if query.contains(':') {
		name == query
	} else {
		local_name(name) == query
	}
}

fn local_name(name: &str) -> &str {
	name.rsplit_once(':').map_or(name, |(_, local)| local)
}

impl Element {
	fn open(start: &BytesStart<'_>) -> Result<Self> {
		let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
		let attributes = start
			.attributes()
			.map(|attr| -> Result<(String, String)> {
				let attr = attr?;
				Ok((
					String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
					attr.unescape_value()?.into_owned(),
				))
			})
			.collect::<Result<Vec<_>>>()?;

		Ok(Self {
			name,
			attributes,
			..Self::default()
		})
	}

	pub fn local_name(&self) -> &str {
		local_name(&self.name)
	}

	pub fn matches(&self, query: &str) -> bool {
		name_matches(&self.name, query)
	}

	pub fn child(&self, query: &str) -> Option<&Element> {
		self.children.iter().find(|c| c.matches(query))
	}

	pub fn children<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
		self.children.iter().filter(move |c| c.matches(query))
	}

	pub fn attribute(&self, query: &str) -> Option<&str> {
		self.attributes
			.iter()
			.find(|(k, _)| name_matches(k, query))
			.map(|(_, v)| v.as_str())
	}

	pub fn require(&self, query: &str) -> Result<&Element, FeatureError> {
		self.child(query).ok_or_else(|| FeatureError::MissingElement {
			parent: self.name.clone(),
			name: query.to_string(),
		})
	}
}

/// Parses a whole document into its root element.
pub fn parse_document(body: &str) -> Result<Element> {
	let mut reader = Reader::from_str(body);
	reader.config_mut().trim_text(true);

	let mut stack: Vec<Element> = Vec::new();
	loop {
		let closed = match reader.read_event()? {
			Event::Start(start) => {
				stack.push(Element::open(&start)?);
				None
			}
			Event::Empty(start) => Some(Element::open(&start)?),
			Event::End(_) => Some(
				stack
					.pop()
					.ok_or_else(|| eyre!("unbalanced end tag at byte {}", reader.buffer_position()))?,
			),
			Event::Text(text) => {
				if let Some(top) = stack.last_mut() {
					top.text.push_str(&text.unescape()?);
				}
				None
			}
			Event::CData(data) => {
				if let Some(top) = stack.last_mut() {
					top.text.push_str(&String::from_utf8_lossy(&data));
				}
				None
			}
			Event::Eof => return Err(eyre!("document ended before its root element was closed")),
			_ => None,
		};

		if let Some(element) = closed {
			match stack.last_mut() {
				Some(parent) => parent.children.push(element),
				None => {
					trace!(root=%element.name, "parsed xml document");
					return Ok(element);
				}
			}
		}
	}
}

/// A feature attribute value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
	Number(f64),
	Text(String),
	List(Vec<AttributeValue>),
	Nested(Attributes),
}

pub type Attributes = BTreeMap<String, AttributeValue>;

impl AttributeValue {
	fn scalar(text: &str) -> Self {
		match text.parse::<f64>() {
			Ok(n) if n.is_finite() && is_plain_number(text) => Self::Number(n),
			_ => Self::Text(text.to_string()),
		}
	}

	fn from_element(element: &Element) -> Self {
		if element.attributes.is_empty() && element.children.is_empty() {
			return Self::scalar(&element.text);
		}

		let mut map = collect_attributes(element, |_| true);
		if !element.text.is_empty() {
			map.insert("#text".into(), Self::scalar(&element.text));
		}
		Self::Nested(map)
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Text(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Number(n) => Some(*n),
			_ => None,
		}
	}
}

impl From<&AttributeValue> for serde_json::Value {
	fn from(value: &AttributeValue) -> Self {
		match value {
			AttributeValue::Number(n) => serde_json::Number::from_f64(*n)
				.map(Self::Number)
				.unwrap_or(Self::Null),
			AttributeValue::Text(s) => Self::String(s.clone()),
			AttributeValue::List(items) => Self::Array(items.iter().map(Self::from).collect()),
			AttributeValue::Nested(map) => Self::Object(
				map.iter()
					.map(|(k, v)| (k.clone(), Self::from(v)))
					.collect(),
			),
		}
	}
}

/// Numbers with leading zeros or signs are identifiers, not quantities.
fn is_plain_number(text: &str) -> bool {
	let unsigned = text.strip_prefix('-').unwrap_or(text);
	let integral = unsigned
		.split(|c: char| c == '.' || c == 'e' || c == 'E')
		.next()
		.unwrap_or_default();

	!integral.is_empty()
		&& integral.chars().all(|c| c.is_ascii_digit())
		&& (integral == "0" || !integral.starts_with('0'))
		&& unsigned
			.chars()
			.all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

/// XML attributes as `@name`, child elements by name, repeated children as lists.
fn collect_attributes(element: &Element, keep: impl Fn(&Element) -> bool) -> Attributes {
	let mut map = Attributes::new();
	for (key, value) in &element.attributes {
		if key == "xmlns" || key.starts_with("xmlns:") {
			continue;
		}
		map.insert(format!("@{}", key), AttributeValue::Text(value.clone()));
	}

	let groups = element
		.children
		.iter()
		.filter(|c| keep(c))
		.sorted_by(|a, b| a.name.cmp(&b.name))
		.group_by(|c| c.name.clone());

	for (name, group) in &groups {
		let mut values = group.map(AttributeValue::from_element).collect::<Vec<_>>();
		let value = if values.len() == 1 {
			values.remove(0)
		} else {
			AttributeValue::List(values)
		};
		map.insert(name, value);
	}

	map
}

/// One feature as delivered by the service, geometry still in projected units.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFeature {
	/// Position among the collection's members.
	pub index: usize,
	pub id: Option<String>,
	pub ring: Vec<[f64; 3]>,
	pub attributes: Attributes,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedFeature {
	pub index: usize,
	pub id: Option<String>,
	pub reason: FeatureError,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureBatch {
	pub features: Vec<ParsedFeature>,
	pub skipped: Vec<SkippedFeature>,
}

/// Extracts every `wfs:member` of a feature collection.
///
/// Fails only when the document itself is unusable; a member that cannot be
/// read lands in [`FeatureBatch::skipped`] and the rest carry on.
pub fn parse_features(body: &str, type_name: &str, geometry_key: &str) -> Result<FeatureBatch> {
	let root = parse_document(body)?;
	if !root.matches("wfs:FeatureCollection") {
		return Err(eyre!("expected wfs:FeatureCollection, found {}", root.name));
	}

	let mut batch = FeatureBatch::default();
	for (index, member) in root.children("wfs:member").enumerate() {
		match parse_member(index, member, type_name, geometry_key) {
			Ok(feature) => {
				trace!(%index, id=?feature.id, vertices=%feature.ring.len(), "parsed feature");
				batch.features.push(feature);
			}
			Err(reason) => {
				let id = member
					.child(type_name)
					.and_then(|f| f.attribute("gml:id"))
					.map(String::from);
				debug!(%type_name, %index, ?id, %reason, "skipping feature");
				batch.skipped.push(SkippedFeature { index, id, reason });
			}
		}
	}

	debug!(
		%type_name,
		parsed=%batch.features.len(),
		skipped=%batch.skipped.len(),
		"parsed feature collection"
	);
	Ok(batch)
}

fn parse_member(
	index: usize,
	member: &Element,
	type_name: &str,
	geometry_key: &str,
) -> Result<ParsedFeature, FeatureError> {
	let feature = member.require(type_name)?;
	let pos_list = feature
		.require(geometry_key)?
		.require("gml:Polygon")?
		.require("gml:exterior")?
		.require("gml:LinearRing")?
		.require("gml:posList")?;

	Ok(ParsedFeature {
		index,
		id: feature.attribute("gml:id").map(String::from),
		ring: parse_pos_list(&pos_list.text)?,
		attributes: collect_attributes(feature, |c| !c.matches(geometry_key)),
	})
}

/// Splits a `gml:posList` into (x, y, z) triples.
pub fn parse_pos_list(text: &str) -> Result<Vec<[f64; 3]>, FeatureError> {
	let tokens = text.split_whitespace().collect::<Vec<_>>();
	if tokens.len() % 3 != 0 {
		return Err(FeatureError::MalformedPosList {
			values: tokens.len(),
		});
	}

	tokens
		.into_iter()
		.map(|token| match token.parse::<f64>() {
			Ok(n) if n.is_finite() => Ok(n),
			_ => Err(FeatureError::InvalidNumber {
				token: token.to_string(),
			}),
		})
		.tuples()
		.map(|(x, y, z)| -> Result<[f64; 3], FeatureError> { Ok([x?, y?, z?]) })
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn member(id: &str, pos_list: &str) -> String {
		format!(
			r#"<wfs:member>
				<adv:AX_Gebaeude gml:id="{id}">
					<adv:gebaeudefunktion>2000</adv:gebaeudefunktion>
					<adv:name>Rathaus &amp; Archiv</adv:name>
					<adv:lage xlink:href="urn:adv:oid:DENW0001"/>
					<adv:lage xlink:href="urn:adv:oid:DENW0002"/>
					<adv:position>
						<gml:Polygon gml:id="{id}_p" srsName="urn:ogc:def:crs:EPSG::25832">
							<gml:exterior>
								<gml:LinearRing>
									<gml:posList>{pos_list}</gml:posList>
								</gml:LinearRing>
							</gml:exterior>
						</gml:Polygon>
					</adv:position>
				</adv:AX_Gebaeude>
			</wfs:member>"#
		)
	}

	fn collection(members: &[String]) -> String {
		format!(
			r#"<?xml version="1.0" encoding="UTF-8"?>
			<wfs:FeatureCollection
				xmlns:wfs="http://www.opengis.net/wfs/2.0"
				xmlns:gml="http://www.opengis.net/gml/3.2"
				xmlns:adv="http://www.adv-online.de/namespaces/adv/gid/7.1"
				xmlns:xlink="http://www.w3.org/1999/xlink"
				numberMatched="{n}" numberReturned="{n}">
				{members}
			</wfs:FeatureCollection>"#,
			n = members.len(),
			members = members.join("\n"),
		)
	}

	const SQUARE: &str = "359600 5651700 0 359610 5651700 0 359610 5651710 0 359600 5651700 0";

	#[test]
	fn one_feature() {
		let body = collection(&[member("DENW01", SQUARE)]);
		let batch = parse_features(&body, "adv:AX_Gebaeude", "position").unwrap();

		assert!(batch.skipped.is_empty());
		assert_eq!(batch.features.len(), 1);

		let feature = &batch.features[0];
		assert_eq!(feature.id.as_deref(), Some("DENW01"));
		assert_eq!(feature.ring.len(), 4);
		assert_eq!(feature.ring[1], [359610.0, 5651700.0, 0.0]);

		let attrs = &feature.attributes;
		assert!(!attrs.contains_key("adv:position"));
		assert!(!attrs.contains_key("position"));
		assert_eq!(attrs["@gml:id"], AttributeValue::Text("DENW01".into()));
		assert_eq!(attrs["adv:gebaeudefunktion"], AttributeValue::Number(2000.0));
		assert_eq!(attrs["adv:name"].as_str(), Some("Rathaus & Archiv"));

		match &attrs["adv:lage"] {
			AttributeValue::List(items) => {
				assert_eq!(items.len(), 2);
				match &items[0] {
					AttributeValue::Nested(map) => {
						assert_eq!(map["@xlink:href"].as_str(), Some("urn:adv:oid:DENW0001"));
					}
					other => panic!("unexpected {:?}", other),
				}
			}
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn malformed_member_is_skipped() {
		let body = collection(&[
			member("DENW01", SQUARE),
			member("DENW02", "359600 5651700 0 359610 5651700"),
		]);
		let batch = parse_features(&body, "adv:AX_Gebaeude", "position").unwrap();

		assert_eq!(batch.features.len(), 1);
		assert_eq!(batch.skipped.len(), 1);
		assert_eq!(batch.skipped[0].index, 1);
		assert_eq!(batch.skipped[0].id.as_deref(), Some("DENW02"));
		assert_eq!(batch.skipped[0].reason, FeatureError::MalformedPosList { values: 5 });
	}

	#[test]
	fn missing_geometry_and_wrong_type() {
		let no_geometry = r#"<wfs:member><adv:AX_Gebaeude gml:id="X"><adv:name>x</adv:name></adv:AX_Gebaeude></wfs:member>"#;
		let other_type = r#"<wfs:member><adv:AX_Flurstueck gml:id="Y"/></wfs:member>"#;
		let body = collection(&[no_geometry.to_string(), other_type.to_string()]);
		let batch = parse_features(&body, "adv:AX_Gebaeude", "position").unwrap();

		assert!(batch.features.is_empty());
		assert_eq!(
			batch.skipped[0].reason,
			FeatureError::MissingElement {
				parent: "adv:AX_Gebaeude".into(),
				name: "position".into()
			}
		);
		assert!(matches!(batch.skipped[1].reason, FeatureError::MissingElement { .. }));
		assert_eq!(batch.skipped[1].id, None);
	}

	#[test]
	fn empty_collection() {
		let batch = parse_features(&collection(&[]), "adv:AX_Gebaeude", "position").unwrap();
		assert_eq!(batch, FeatureBatch::default());
	}

	#[test]
	fn unusable_documents() {
		assert!(parse_features("", "a", "position").is_err());
		assert!(parse_features("<wfs:FeatureCollection>", "a", "position").is_err());
		assert!(parse_features("<other/>", "a", "position").is_err());
		assert!(parse_features("not xml at all", "a", "position").is_err());
	}

	#[test]
	fn pos_list() {
		assert_eq!(parse_pos_list("1 2 3\n4 5 6").unwrap(), vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
		assert_eq!(
			parse_pos_list("1 2 x"),
			Err(FeatureError::InvalidNumber { token: "x".into() })
		);
		assert_eq!(parse_pos_list("1 2 3 4"), Err(FeatureError::MalformedPosList { values: 4 }));
		assert_eq!(
			parse_pos_list("1 2 3 NaN NaN 0"),
			Err(FeatureError::InvalidNumber { token: "NaN".into() })
		);
		assert_eq!(
			parse_pos_list("inf 2 3"),
			Err(FeatureError::InvalidNumber { token: "inf".into() })
		);
		assert_eq!(
			parse_pos_list("1 -infinity 3"),
			Err(FeatureError::InvalidNumber { token: "-infinity".into() })
		);
		assert_eq!(parse_pos_list("  ").unwrap(), Vec::<[f64; 3]>::new());
	}

	#[test]
	fn scalar_typing() {
		assert_eq!(AttributeValue::scalar("12.5"), AttributeValue::Number(12.5));
		assert_eq!(AttributeValue::scalar("0.5"), AttributeValue::Number(0.5));
		assert_eq!(AttributeValue::scalar("-3"), AttributeValue::Number(-3.0));
		assert_eq!(AttributeValue::scalar("053123"), AttributeValue::Text("053123".into()));
		assert_eq!(AttributeValue::scalar("+3"), AttributeValue::Text("+3".into()));
		assert_eq!(AttributeValue::scalar("NaN"), AttributeValue::Text("NaN".into()));
		assert_eq!(AttributeValue::scalar("2021-04-01"), AttributeValue::Text("2021-04-01".into()));
		assert_eq!(AttributeValue::scalar(""), AttributeValue::Text("".into()));
	}

	#[test]
	fn mixed_content_uses_text_key() {
		let root = parse_document(r#"<a:x><a:h uom="m">12.5</a:h></a:x>"#).unwrap();
		let attrs = collect_attributes(&root, |_| true);
		match &attrs["a:h"] {
			AttributeValue::Nested(map) => {
				assert_eq!(map["@uom"].as_str(), Some("m"));
				assert_eq!(map["#text"].as_f64(), Some(12.5));
			}
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn name_lookup() {
		assert!(name_matches("adv:position", "position"));
		assert!(name_matches("position", "position"));
		assert!(!name_matches("adv:position", "gml:position"));
		assert!(name_matches("gml:posList", "gml:posList"));
	}
}
