// used for date and date-time coercion
use chrono::{NaiveDate, NaiveDateTime};
// used for decimal numbers
use bigdecimal::BigDecimal;

// used when parsing literal strings into concrete types
use std::str::FromStr;
// used to print out readable forms of a literal
use std::fmt;
// used to overload common operations for datatypes
use std::ops;

use crate::error::{Result, TopikaError};
use crate::locator::Locator;

/// The datatype IRIs a literal may carry. Values are stored as strings and
/// coerced on read; these constants name the coercion targets.
pub mod xsd {
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const ANY_URI: &str = "http://www.w3.org/2001/XMLSchema#anyURI";
    pub const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const LONG: &str = "http://www.w3.org/2001/XMLSchema#long";
    pub const FLOAT: &str = "http://www.w3.org/2001/XMLSchema#float";
    pub const DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
    pub const DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
}

/// Datatype IRIs for the geographic coercion targets.
pub const WGS84_COORDINATE: &str = "http://topika.dev/datatype/wgs84-coordinate";
pub const WGS84_SURFACE: &str = "http://topika.dev/datatype/wgs84-surface";

// ------------- Decimal -------------
#[derive(Eq, PartialEq, Hash, PartialOrd, Ord, Clone, Debug)]
pub struct Decimal(BigDecimal);

impl Decimal {
    pub fn from_str(s: &str) -> Option<Decimal> {
        match BigDecimal::from_str(s) {
            Ok(decimal) => Some(Decimal(decimal)),
            _ => None,
        }
    }
}
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl ops::Deref for Decimal {
    type Target = BigDecimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ------------- Geographic types -------------
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}
impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }
}
impl FromStr for GeoCoordinate {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        let (lat, lon) = s.split_once(',').ok_or(())?;
        let latitude = lat.trim().parse::<f64>().map_err(|_| ())?;
        let longitude = lon.trim().parse::<f64>().map_err(|_| ())?;
        GeoCoordinate::new(latitude, longitude).ok_or(())
    }
}
impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// A closed ring of coordinates. Serialized as semicolon-separated pairs.
#[derive(PartialEq, Clone, Debug)]
pub struct GeoSurface(pub Vec<GeoCoordinate>);

impl fmt::Display for GeoSurface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        for c in &self.0 {
            s += &(c.to_string() + ";");
        }
        s.pop();
        write!(f, "{s}")
    }
}

// ------------- Literal -------------
/// A literal value: the lexical form plus the datatype locator it was written
/// with. The two are only ever set together; coercion happens on read and
/// fails with [`TopikaError::Coercion`] when the lexical form does not parse.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct Literal {
    value: String,
    datatype: String,
}

impl Literal {
    /// An arbitrary lexical form with an explicit datatype locator.
    pub fn new(value: impl Into<String>, datatype: &str) -> Result<Self> {
        Ok(Self {
            value: value.into(),
            datatype: Locator::normalize(datatype)?,
        })
    }
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: xsd::STRING.to_owned(),
        }
    }
    pub fn iri(reference: &str) -> Result<Self> {
        Ok(Self {
            value: Locator::normalize(reference)?,
            datatype: xsd::ANY_URI.to_owned(),
        })
    }
    pub fn boolean(value: bool) -> Self {
        Self {
            value: value.to_string(),
            datatype: xsd::BOOLEAN.to_owned(),
        }
    }
    pub fn integer(value: i64) -> Self {
        Self {
            value: value.to_string(),
            datatype: xsd::INTEGER.to_owned(),
        }
    }
    pub fn double(value: f64) -> Self {
        Self {
            value: value.to_string(),
            datatype: xsd::DOUBLE.to_owned(),
        }
    }
    pub fn decimal(value: Decimal) -> Self {
        Self {
            value: value.to_string(),
            datatype: xsd::DECIMAL.to_owned(),
        }
    }
    pub fn date(value: NaiveDate) -> Self {
        Self {
            value: value.to_string(),
            datatype: xsd::DATE.to_owned(),
        }
    }
    pub fn datetime(value: NaiveDateTime) -> Self {
        Self {
            value: value.format("%Y-%m-%dT%H:%M:%S").to_string(),
            datatype: xsd::DATE_TIME.to_owned(),
        }
    }
    pub fn coordinate(value: GeoCoordinate) -> Self {
        Self {
            value: value.to_string(),
            datatype: WGS84_COORDINATE.to_owned(),
        }
    }
    pub fn surface(value: GeoSurface) -> Self {
        Self {
            value: value.to_string(),
            datatype: WGS84_SURFACE.to_owned(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }
    pub fn datatype(&self) -> &str {
        &self.datatype
    }

    fn coercion(&self, target: &'static str) -> TopikaError {
        TopikaError::Coercion {
            value: self.value.clone(),
            target,
        }
    }
    pub fn to_boolean(&self) -> Result<bool> {
        match self.value.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(self.coercion("boolean")),
        }
    }
    pub fn to_integer(&self) -> Result<i64> {
        self.value
            .trim()
            .parse::<i64>()
            .map_err(|_| self.coercion("integer"))
    }
    /// Same width as [`Self::to_integer`]; kept as a separate accessor so the
    /// xsd:long lexical space has a named coercion.
    pub fn to_long(&self) -> Result<i64> {
        self.value
            .trim()
            .parse::<i64>()
            .map_err(|_| self.coercion("long"))
    }
    pub fn to_float(&self) -> Result<f32> {
        self.value
            .trim()
            .parse::<f32>()
            .map_err(|_| self.coercion("float"))
    }
    pub fn to_double(&self) -> Result<f64> {
        self.value
            .trim()
            .parse::<f64>()
            .map_err(|_| self.coercion("double"))
    }
    pub fn to_decimal(&self) -> Result<Decimal> {
        Decimal::from_str(self.value.trim()).ok_or_else(|| self.coercion("decimal"))
    }
    pub fn to_date(&self) -> Result<NaiveDate> {
        NaiveDate::from_str(self.value.trim()).map_err(|_| self.coercion("date"))
    }
    pub fn to_datetime(&self) -> Result<NaiveDateTime> {
        NaiveDateTime::from_str(self.value.trim()).map_err(|_| self.coercion("dateTime"))
    }
    /// The literal as an absolute IRI reference.
    pub fn to_iri(&self) -> Result<String> {
        Locator::normalize(&self.value).map_err(|_| self.coercion("IRI"))
    }
    pub fn to_coordinate(&self) -> Result<GeoCoordinate> {
        GeoCoordinate::from_str(&self.value).map_err(|_| self.coercion("wgs84 coordinate"))
    }
    pub fn to_surface(&self) -> Result<GeoSurface> {
        let mut ring = Vec::new();
        for part in self.value.split(';') {
            ring.push(GeoCoordinate::from_str(part).map_err(|_| self.coercion("wgs84 surface"))?);
        }
        if ring.len() < 3 {
            return Err(self.coercion("wgs84 surface"));
        }
        Ok(GeoSurface(ring))
    }
}
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"^^<{}>", self.value, self.datatype)
    }
}
