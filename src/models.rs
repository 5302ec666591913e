use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FoodShareError;

/// One day of manually entered impact figures.
///
/// Numeric fields deserialize leniently: a missing column, an empty cell or
/// any non-numeric value counts as zero, and negatives clamp to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    pub date: NaiveDate,
    #[serde(default, alias = "foodSavedKg", deserialize_with = "lenient::kilograms")]
    pub food_saved_kg: f64,
    #[serde(default, alias = "peopleHelped", deserialize_with = "lenient::count")]
    pub people_helped: i64,
    #[serde(default, alias = "mealsProvided", deserialize_with = "lenient::count")]
    pub meals_provided: i64,
    #[serde(default, alias = "co2ReducedKg", deserialize_with = "lenient::kilograms")]
    pub co2_reduced_kg: f64,
    #[serde(default, alias = "wasteDivertedKg", deserialize_with = "lenient::kilograms")]
    pub waste_diverted_kg: f64,
    #[serde(default, alias = "volunteerHours", deserialize_with = "lenient::kilograms")]
    pub volunteer_hours: f64,
    #[serde(
        default,
        alias = "partnerOrganizations",
        deserialize_with = "lenient::count"
    )]
    pub partner_organizations: i64,
}

impl ImpactRecord {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            food_saved_kg: 0.0,
            people_helped: 0,
            meals_provided: 0,
            co2_reduced_kg: 0.0,
            waste_diverted_kg: 0.0,
            volunteer_hours: 0.0,
            partner_organizations: 0,
        }
    }
}

/// Quantities are non-negative and finite; anything else counts as zero.
pub fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImpactTotals {
    pub record_count: usize,
    pub claim_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub food_saved_kg: f64,
    pub people_helped: i64,
    pub meals_provided: i64,
    pub co2_reduced_kg: f64,
    pub waste_diverted_kg: f64,
    pub volunteer_hours: f64,
    pub partner_organizations: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyImpact {
    pub month: String,
    pub totals: ImpactTotals,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Approved,
    Declined,
    Completed,
}

pub type ListingStatus = Status;
pub type ClaimStatus = Status;

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Declined => "declined",
            Status::Completed => "completed",
        }
    }

    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::Approved)
                | (Status::Pending, Status::Declined)
                | (Status::Approved, Status::Completed)
        )
    }

    /// Validates a move to `next`; `kind` names the record in the error.
    pub fn transition(self, next: Status, kind: &'static str) -> Result<Status, FoodShareError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(FoodShareError::InvalidTransition {
                kind,
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = FoodShareError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "approved" | "approve" => Ok(Status::Approved),
            "declined" | "decline" => Ok(Status::Declined),
            "completed" | "complete" => Ok(Status::Completed),
            other => Err(FoodShareError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodListing {
    pub id: Uuid,
    pub donor_name: String,
    pub title: String,
    pub description: Option<String>,
    pub quantity_kg: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: ListingStatus,
    pub pickup_by: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodClaim {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub claimant_name: String,
    pub claimant_email: String,
    pub quantity_kg: f64,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FoodClaim {
    /// Day the claim's impact counts towards.
    pub fn impact_date(&self) -> NaiveDate {
        self.completed_at.unwrap_or(self.created_at).date_naive()
    }
}

/// Stored impact records and the completed claims that add to them.
#[derive(Debug, Clone, Default)]
pub struct ImpactSources {
    pub records: Vec<ImpactRecord>,
    pub claims: Vec<FoodClaim>,
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub donor_name: String,
    pub title: String,
    pub description: Option<String>,
    pub quantity_kg: f64,
    pub location: Option<Coordinate>,
    pub pickup_by: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewClaim {
    pub listing_id: Uuid,
    pub claimant_name: String,
    pub claimant_email: String,
    pub quantity_kg: f64,
}

mod lenient {
    use std::fmt;

    use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};

    use super::non_negative;

    struct AnyNumber;

    impl<'de> Visitor<'de> for AnyNumber {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number, a numeric string or nothing")
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<f64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_i128<E: de::Error>(self, value: i128) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_u128<E: de::Error>(self, value: u128) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_bool<E: de::Error>(self, _: bool) -> Result<f64, E> {
            Ok(0.0)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<f64, E> {
            Ok(value.trim().parse::<f64>().unwrap_or(0.0))
        }

        fn visit_none<E: de::Error>(self) -> Result<f64, E> {
            Ok(0.0)
        }

        fn visit_unit<E: de::Error>(self) -> Result<f64, E> {
            Ok(0.0)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<f64, D::Error> {
            deserializer.deserialize_any(AnyNumber)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<f64, A::Error> {
            while seq.next_element::<IgnoredAny>()?.is_some() {}
            Ok(0.0)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<f64, A::Error> {
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            Ok(0.0)
        }
    }

    pub fn kilograms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(AnyNumber).map(non_negative)
    }

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        kilograms(deserializer).map(|value| value.trunc() as i64)
    }
}
