//! Core data types for location keys, normalized records and feature records.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{InvalidCategory, InvalidKey};

/// A normalized postal or district identifier.
///
/// Construction trims, uppercases and collapses internal whitespace, so
/// `"sw1a  1aa "` and `"SW1A 1AA"` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationKey(String);

impl LocationKey {
    /// Parse and normalize a raw key.
    pub fn parse(raw: &str) -> Result<Self, InvalidKey> {
        let canonical = raw
            .split_whitespace()
            .map(str::to_ascii_uppercase)
            .collect::<Vec<_>>()
            .join(" ");

        if canonical.is_empty() {
            return Err(InvalidKey::Empty);
        }
        if let Some(found) = canonical
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == ' '))
        {
            return Err(InvalidKey::Character {
                key: raw.trim().to_string(),
                found,
            });
        }

        Ok(Self(canonical))
    }

    /// Canonical spaced form, e.g. `SW1A 1AA`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-safe form used as the cache entry stem, e.g. `SW1A_1AA`.
    pub fn cache_stem(&self) -> String {
        self.0.replace(' ', "_")
    }

    /// Form without any spaces, e.g. `SW1A1AA`.
    pub fn compact(&self) -> String {
        self.0.replace(' ', "")
    }

    /// District (outward) part: the text before the first space.
    pub fn outward(&self) -> &str {
        self.0.split(' ').next().unwrap_or(&self.0)
    }

    /// Whether the key is a bare district rather than a full postcode.
    pub fn is_district(&self) -> bool {
        !self.0.contains(' ')
    }

    /// Leading letters plus the first digit run of the outward code.
    ///
    /// `SW1A` → `SW1`, `EC1V` → `EC1`, `UB5` → `UB5`.
    pub fn district_prefix(&self) -> &str {
        let outward = self.outward();
        let letters = outward
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(outward.len());
        let end = outward[letters..]
            .find(|c: char| !c.is_ascii_digit())
            .map(|i| letters + i)
            .unwrap_or(outward.len());
        &outward[..end]
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LocationKey {
    type Err = InvalidKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LocationKey {
    type Error = InvalidKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LocationKey> for String {
    fn from(key: LocationKey) -> Self {
        key.0
    }
}

/// A single numeric or categorical field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Number(v) => Some(v.trunc() as i64),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Declared type of a canonical field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Number,
    Text,
}

impl FieldKind {
    /// Sentinel used when a source does not report the field.
    pub fn neutral(self) -> FieldValue {
        match self {
            Self::Integer => FieldValue::Integer(0),
            Self::Number => FieldValue::Number(0.0),
            Self::Text => FieldValue::Text(NOT_AVAILABLE.to_string()),
        }
    }

    /// Coerce a value to this kind, or `None` if it cannot be represented.
    fn coerce(self, value: FieldValue) -> Option<FieldValue> {
        match (self, value) {
            (Self::Integer, FieldValue::Integer(v)) => Some(FieldValue::Integer(v)),
            (Self::Integer, FieldValue::Number(v)) if v.is_finite() => {
                Some(FieldValue::Integer(v.trunc() as i64))
            }
            (Self::Number, FieldValue::Number(v)) if v.is_finite() => Some(FieldValue::Number(v)),
            (Self::Number, FieldValue::Integer(v)) => Some(FieldValue::Number(v as f64)),
            (Self::Text, FieldValue::Text(s)) => Some(FieldValue::Text(s)),
            (Self::Text, other) => Some(FieldValue::Text(other.to_string())),
            _ => None,
        }
    }
}

/// Text sentinel for categorical fields a source did not report.
pub const NOT_AVAILABLE: &str = "N/A";

/// A canonical field name with its declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

const DEMOGRAPHICS_SCHEMA: &[FieldSpec] = &[
    field("population", FieldKind::Integer),
    field("households", FieldKind::Integer),
    field("avg_household_income", FieldKind::Integer),
    field("unemployment_rate", FieldKind::Number),
    field("working", FieldKind::Number),
    field("unemployed", FieldKind::Number),
    field("ab", FieldKind::Number),
    field("c1_c2", FieldKind::Number),
    field("de", FieldKind::Number),
    field("white", FieldKind::Number),
    field("non_white", FieldKind::Number),
];

const TRANSPORT_SCHEMA: &[FieldSpec] = &[
    field("transport_score", FieldKind::Integer),
    field("travel_zone", FieldKind::Text),
    field("distance_to_nearest", FieldKind::Number),
    field("nearest_type", FieldKind::Text),
    field("station_count", FieldKind::Integer),
    field("pubs", FieldKind::Integer),
    field("restaurants", FieldKind::Integer),
];

const GEOCODING_SCHEMA: &[FieldSpec] = &[
    field("latitude", FieldKind::Number),
    field("longitude", FieldKind::Number),
    field("admin_district", FieldKind::Text),
    field("region", FieldKind::Text),
    field("country", FieldKind::Text),
];

/// Nearby-venue counts are capped at the first page of search results.
const PLACES_SCHEMA: &[FieldSpec] = &[
    field("universities", FieldKind::Integer),
    field("hospitals", FieldKind::Integer),
    field("major_businesses", FieldKind::Integer),
    field("avg_place_rating", FieldKind::Number),
    field("total_reviews", FieldKind::Integer),
];

/// A logical category of data acquired per location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    Demographics,
    Transport,
    Geocoding,
    Places,
}

impl Concept {
    pub const ALL: [Concept; 4] = [
        Self::Demographics,
        Self::Transport,
        Self::Geocoding,
        Self::Places,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Demographics => "demographics",
            Self::Transport => "transport",
            Self::Geocoding => "geocoding",
            Self::Places => "places",
        }
    }

    /// Cache category the concept's records are stored under.
    pub fn category(self) -> Category {
        match self {
            Self::Demographics => Category::DEMOGRAPHICS,
            Self::Transport => Category::TRANSPORT,
            Self::Geocoding => Category::GEOCODING,
            Self::Places => Category::PLACES,
        }
    }

    /// Canonical field set every adapter for this concept conforms to.
    pub fn schema(self) -> &'static [FieldSpec] {
        match self {
            Self::Demographics => DEMOGRAPHICS_SCHEMA,
            Self::Transport => TRANSPORT_SCHEMA,
            Self::Geocoding => GEOCODING_SCHEMA,
            Self::Places => PLACES_SCHEMA,
        }
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache category: a lowercase directory name under the cache root.
///
/// The well-known set is open to extension through [`Category::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Category(Cow<'static, str>);

impl Category {
    pub const DEMOGRAPHICS: Category = Category(Cow::Borrowed("demographics"));
    pub const TRANSPORT: Category = Category(Cow::Borrowed("transport"));
    pub const PLACES: Category = Category(Cow::Borrowed("places"));
    pub const SALES: Category = Category(Cow::Borrowed("sales"));
    pub const GEOCODING: Category = Category(Cow::Borrowed("geocoding"));

    /// Categories whose directories are created when a cache is opened.
    pub const KNOWN: [Category; 5] = [
        Self::DEMOGRAPHICS,
        Self::TRANSPORT,
        Self::PLACES,
        Self::SALES,
        Self::GEOCODING,
    ];

    /// Validate a custom category name (`[a-z0-9_-]+`).
    pub fn new(name: &str) -> Result<Self, InvalidCategory> {
        let name = name.trim();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(InvalidCategory(name.to_string()));
        }
        Ok(Self(Cow::Owned(name.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Category {
    type Err = InvalidCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// A source's output translated into a concept's canonical field set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRecord(BTreeMap<String, FieldValue>);

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Restrict the record to `schema`, filling absent or mistyped fields
    /// with their neutral sentinel.
    pub fn conform(mut self, schema: &[FieldSpec]) -> Self {
        let fields = schema
            .iter()
            .map(|spec| {
                let value = self
                    .0
                    .remove(spec.name)
                    .and_then(|v| spec.kind.coerce(v))
                    .unwrap_or_else(|| spec.kind.neutral());
                (spec.name.to_string(), value)
            })
            .collect();
        Self(fields)
    }
}

impl IntoIterator for NormalizedRecord {
    type Item = (String, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for NormalizedRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Flat per-request map handed to downstream consumers.
///
/// Combines every concept's record under canonical (possibly renamed)
/// field names, plus the location key itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord(BTreeMap<String, FieldValue>);

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert, returning the value previously stored under `name`.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }
}
