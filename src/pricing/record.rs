use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::provider::RawSpotPrice;

/// The closed set of instance families the scanner understands.
///
/// Families outside this set can still flow through the pipeline under a
/// flat threshold policy; only the per-unit policy needs to recognize the
/// family, and reports an [`ClassifyError::UnknownFamily`] otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceFamily {
    G5,
    G6e,
}

impl InstanceFamily {
    pub const ALL: [InstanceFamily; 2] = [InstanceFamily::G5, InstanceFamily::G6e];

    /// The lowercase prefix this family uses in instance type names.
    pub fn prefix(&self) -> &'static str {
        match self {
            InstanceFamily::G5 => "g5",
            InstanceFamily::G6e => "g6e",
        }
    }
}

impl fmt::Display for InstanceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for InstanceFamily {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "g5" => Ok(InstanceFamily::G5),
            "g6e" => Ok(InstanceFamily::G6e),
            other => Err(ClassifyError::UnknownFamily(other.to_string())),
        }
    }
}

/// A raw record from the provider could not be turned into a [`PriceRecord`].
///
/// This is always scoped to the single record: siblings in the same page
/// are unaffected.
#[derive(Debug, Error)]
pub enum RecordDecodeError {
    #[error("record is missing required field {0}")]
    MissingField(&'static str),
    #[error("unparseable spot price {0:?}")]
    BadPrice(String),
    #[error("negative spot price {0}")]
    NegativePrice(f64),
}

/// A record's derived attributes could not be computed.
///
/// Raised only by policies that need the family/size breakdown; the record
/// is excluded from acceptance and the error surfaces as a run warning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("unrecognized instance family in {0:?}")]
    UnknownFamily(String),
    #[error("unrecognized instance size in {0:?}")]
    UnknownSize(String),
}

/// A single normalized spot price observation.
///
/// Immutable once constructed; equality is structural and duplicates
/// across regions are valid (the same instance type can be observed in
/// many zones, and the pipeline never deduplicates).
///
/// # Fields
/// * `instance_type`: opaque provider identifier, e.g. `"g5.48xlarge"`
/// * `zone_id`: opaque availability-zone identifier
/// * `spot_price`: non-negative price in the provider's currency per hour
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub instance_type: String,
    pub zone_id: String,
    pub spot_price: f64,
}

impl PriceRecord {
    /// Decodes one raw page element into a `PriceRecord`.
    ///
    /// The provider marks every field optional on the wire, so each is
    /// checked here; the price arrives as a decimal string and must parse
    /// to a non-negative float.
    ///
    /// # Errors
    /// Returns a [`RecordDecodeError`] naming the first missing or
    /// malformed field. Decode failures never panic and never poison the
    /// rest of the page.
    pub fn from_raw(raw: RawSpotPrice) -> Result<Self, RecordDecodeError> {
        let instance_type = raw
            .instance_type
            .ok_or(RecordDecodeError::MissingField("InstanceType"))?;
        let zone_id = raw
            .availability_zone_id
            .ok_or(RecordDecodeError::MissingField("AvailabilityZoneId"))?;
        let price_text = raw
            .spot_price
            .ok_or(RecordDecodeError::MissingField("SpotPrice"))?;

        let spot_price: f64 = price_text
            .parse()
            .map_err(|_| RecordDecodeError::BadPrice(price_text.clone()))?;
        if spot_price < 0.0 {
            return Err(RecordDecodeError::NegativePrice(spot_price));
        }

        Ok(Self {
            instance_type,
            zone_id,
            spot_price,
        })
    }

    /// First dot-delimited segment of the instance type, as a family.
    pub fn instance_family(&self) -> Result<InstanceFamily, ClassifyError> {
        let family = self
            .instance_type
            .split('.')
            .next()
            .unwrap_or(self.instance_type.as_str());
        family.parse()
    }

    /// Second dot-delimited segment of the instance type.
    pub fn instance_size(&self) -> Result<&str, ClassifyError> {
        self.instance_type
            .split('.')
            .nth(1)
            .ok_or_else(|| ClassifyError::UnknownSize(self.instance_type.clone()))
    }

    /// Number of accelerators for this instance size.
    ///
    /// Fixed lookup over the sizes the scanned families ship in; any other
    /// size is an unrecognized-size error, fatal for this record only.
    pub fn unit_count(&self) -> Result<u32, ClassifyError> {
        match self.instance_size()? {
            "xlarge" | "2xlarge" | "4xlarge" | "8xlarge" | "16xlarge" => Ok(1),
            "12xlarge" | "24xlarge" => Ok(4),
            "48xlarge" => Ok(8),
            _ => Err(ClassifyError::UnknownSize(self.instance_type.clone())),
        }
    }
}

impl fmt::Display for PriceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:.4}",
            self.instance_type, self.zone_id, self.spot_price
        )
    }
}
