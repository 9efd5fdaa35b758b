// src/fetch/shape.rs
//
// The country service returns optional fields in several shapes depending on
// the entity: missing, null, a scalar, a list or a code→name mapping. Each
// field is decoded into `FieldShape` and flattened by one rule per variant.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::process::codes::EntityCode;

/// Separator used when a list or mapping collapses into one cell.
pub const JOIN_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum FieldShape {
    #[default]
    Absent,
    List(Vec<String>),
    /// Kept in document order.
    Mapping(Map<String, Value>),
    Scalar(Scalar),
}

impl FieldShape {
    /// Absent → "", scalar → its text, list → items joined, mapping → values
    /// joined in the order the service sent them.
    pub fn flatten(&self) -> String {
        match self {
            FieldShape::Absent => String::new(),
            FieldShape::Scalar(Scalar::Text(s)) => s.clone(),
            FieldShape::Scalar(Scalar::Number(n)) => n.to_string(),
            FieldShape::Scalar(Scalar::Flag(b)) => b.to_string(),
            FieldShape::List(items) => items.join(JOIN_SEPARATOR),
            FieldShape::Mapping(map) => map
                .values()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(JOIN_SEPARATOR),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NameBlock {
    #[serde(default)]
    pub common: FieldShape,
    #[serde(default)]
    pub official: FieldShape,
    // `nativeName` is intentionally not declared: it is dropped on decode.
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlagsBlock {
    #[serde(default)]
    pub png: FieldShape,
    #[serde(default)]
    pub svg: FieldShape,
    #[serde(default)]
    pub alt: FieldShape,
}

/// Body of one country lookup with the fixed field projection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CountryResponse {
    #[serde(default)]
    pub ccn3: FieldShape,
    #[serde(default)]
    pub name: Option<NameBlock>,
    #[serde(default)]
    pub flags: Option<FlagsBlock>,
    #[serde(default)]
    pub capital: FieldShape,
    #[serde(default)]
    pub languages: FieldShape,
    #[serde(default)]
    pub area: FieldShape,
    #[serde(default)]
    pub population: FieldShape,
}

/// One row of `dim_country_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedEntityRecord {
    pub code: EntityCode,
    pub ccn3: String,
    pub name_common: String,
    pub name_official: String,
    pub capital: String,
    pub languages: String,
    pub area: String,
    pub population: String,
    pub flag_png: String,
    pub flag_svg: String,
    pub flag_alt: String,
}

impl EnrichedEntityRecord {
    pub const HEADER: [&'static str; 11] = [
        "code",
        "ccn3",
        "name_common",
        "name_official",
        "capital",
        "languages",
        "area",
        "population",
        "flag_png",
        "flag_svg",
        "flag_alt",
    ];

    pub fn from_response(code: EntityCode, resp: &CountryResponse) -> Self {
        let name = resp.name.clone().unwrap_or_default();
        let flags = resp.flags.clone().unwrap_or_default();
        Self {
            code,
            ccn3: resp.ccn3.flatten(),
            name_common: name.common.flatten(),
            name_official: name.official.flatten(),
            capital: resp.capital.flatten(),
            languages: resp.languages.flatten(),
            area: resp.area.flatten(),
            population: resp.population.flatten(),
            flag_png: flags.png.flatten(),
            flag_svg: flags.svg.flatten(),
            flag_alt: flags.alt.flatten(),
        }
    }

    /// Cells in `HEADER` order.
    pub fn fields(&self) -> [&str; 11] {
        [
            self.code.as_str(),
            &self.ccn3,
            &self.name_common,
            &self.name_official,
            &self.capital,
            &self.languages,
            &self.area,
            &self.population,
            &self.flag_png,
            &self.flag_svg,
            &self.flag_alt,
        ]
    }
}
