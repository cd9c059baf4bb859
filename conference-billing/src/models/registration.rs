//! Registration read model.
//!
//! Registrations are owned by the wider conference system; billing only
//! reads them (plus the payment status column it maintains).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Registration workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Draft,
    Submitted,
    Confirmed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Draft => "DRAFT",
            RegistrationStatus::Submitted => "SUBMITTED",
            RegistrationStatus::Confirmed => "CONFIRMED",
            RegistrationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "SUBMITTED" => RegistrationStatus::Submitted,
            "CONFIRMED" => RegistrationStatus::Confirmed,
            "CANCELLED" => RegistrationStatus::Cancelled,
            _ => RegistrationStatus::Draft,
        }
    }
}

/// Billing-side payment status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Partial => "PARTIAL",
            PaymentStatus::Paid => "PAID",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "PARTIAL" => PaymentStatus::Partial,
            "PAID" => PaymentStatus::Paid,
            _ => PaymentStatus::Unpaid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Single,
    Double,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Single => "single",
            RoomType::Double => "double",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "double" => RoomType::Double,
            _ => RoomType::Single,
        }
    }
}

/// Who a trip seat is booked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripParticipant {
    #[serde(rename = "self")]
    Registrant,
    Spouse,
}

impl TripParticipant {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripParticipant::Registrant => "self",
            TripParticipant::Spouse => "spouse",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "spouse" => TripParticipant::Spouse,
            _ => TripParticipant::Registrant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccommodationLocation {
    Amman,
    DeadSea,
}

impl AccommodationLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccommodationLocation::Amman => "amman",
            AccommodationLocation::DeadSea => "dead_sea",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "dead_sea" => AccommodationLocation::DeadSea,
            _ => AccommodationLocation::Amman,
        }
    }
}

/// Participation type with its prices and exemption flags.
///
/// Each boolean flag set to `true` exempts the registrant from the matching
/// charge (the flag name follows the legacy schema, so `fees` means "fees are
/// waived", not "fees apply").
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParticipationType {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub spouse_price: Decimal,
    pub special_price: Decimal,
    pub currency: String,
    pub fees: bool,
    pub spouse: bool,
    pub petra: bool,
    pub petra_spouse: bool,
    pub accommodation_amman: bool,
    pub accommodation_aqaba: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    pub code: Option<String>,
}

impl Country {
    /// Jordan is matched by name or ISO code, case-insensitively.
    pub fn is_jordan(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case("jordan")
            || self
                .code
                .as_deref()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case("jo"))
    }
}

/// Company a registrant is billed through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub country: Option<Country>,
    pub tax_number: Option<String>,
    pub email: Option<String>,
    /// Per-company e-invoice credentials; fall back to the configured ones
    /// when absent.
    pub fawaterkom_client_id: Option<String>,
    #[serde(skip_serializing)]
    pub fawaterkom_secret_key: Option<String>,
}

impl Company {
    pub fn is_jordanian(&self) -> bool {
        self.country.as_ref().is_some_and(Country::is_jordan)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Spouse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripBooking {
    pub id: Uuid,
    pub trip: Trip,
    pub participant: TripParticipant,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Uuid,
    pub name: String,
    pub currency: String,
    pub service_percent: Decimal,
    pub tax_percent: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelRoom {
    pub id: Uuid,
    pub name: String,
    pub single_rate: Decimal,
    pub double_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccommodationBooking {
    pub id: Uuid,
    pub location: AccommodationLocation,
    pub hotel: Hotel,
    pub room: HotelRoom,
    pub room_type: RoomType,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub is_active: bool,
}

impl AccommodationBooking {
    /// Nights between check-in and check-out, never fewer than one.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days().max(1)
    }

    pub fn nightly_rate(&self) -> Decimal {
        match self.room_type {
            RoomType::Single => self.room.single_rate,
            RoomType::Double => self.room.double_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: RegistrationStatus,
    pub payment_status: PaymentStatus,
    pub company_id: Option<Uuid>,
    pub participation_type_id: Uuid,
    pub wants_accommodation_amman: bool,
    pub wants_accommodation_dead_sea: bool,
    pub created_utc: DateTime<Utc>,
}

impl Registration {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// Registration with every sub-record the fee engine needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationDetails {
    pub registration: Registration,
    pub participation_type: ParticipationType,
    pub company: Option<Company>,
    pub spouse: Option<Spouse>,
    pub trips: Vec<TripBooking>,
    pub accommodations: Vec<AccommodationBooking>,
}

impl RegistrationDetails {
    pub fn active_spouse(&self) -> Option<&Spouse> {
        self.spouse.as_ref().filter(|s| s.is_active)
    }

    pub fn active_trips(&self) -> impl Iterator<Item = &TripBooking> {
        self.trips.iter().filter(|t| t.is_active)
    }

    pub fn active_accommodation(
        &self,
        location: AccommodationLocation,
    ) -> Option<&AccommodationBooking> {
        self.accommodations
            .iter()
            .find(|a| a.is_active && a.location == location)
    }

    pub fn is_jordanian(&self) -> bool {
        self.company.as_ref().is_some_and(Company::is_jordanian)
    }
}
