use super::money::{round_money, Currency};
use super::PricingConfig;
use crate::models::{
    AccommodationLocation, FeeCategory, FeeLine, FeeLines, RegistrationDetails, TripParticipant,
};
use anyhow::anyhow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::debug;

/// Output of the fee engine. Every line is in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub lines: FeeLines,
    pub total_fees: Decimal,
    pub total_discount: Decimal,
    pub total_value_usd: Decimal,
    pub total_value_jd: Decimal,
    pub exchange_rate: Decimal,
}

impl FeeBreakdown {
    pub fn empty(exchange_rate: Decimal) -> Self {
        Self {
            lines: FeeLines::default(),
            total_fees: Decimal::ZERO,
            total_discount: Decimal::ZERO,
            total_value_usd: Decimal::ZERO,
            total_value_jd: Decimal::ZERO,
            exchange_rate,
        }
    }

    fn from_lines(lines: FeeLines, exchange_rate: Decimal) -> Self {
        let total_fees = round_money(lines.total_fees());
        let total_discount = round_money(lines.total_discount());
        let total_value_usd = round_money(total_fees - total_discount);
        Self {
            lines,
            total_fees,
            total_discount,
            total_value_usd,
            total_value_jd: round_money(total_value_usd * exchange_rate),
            exchange_rate,
        }
    }

    /// Carry admin adjustments (discounts, disclosures, payment flags) over
    /// from a previous computation of the same invoice.
    pub fn with_adjustments_from(mut self, previous: &FeeLines) -> Self {
        for category in FeeCategory::ALL {
            let old = previous.get(category);
            let line = self.lines.get_mut(category);
            line.discount = old.discount;
            line.disclosure = old.disclosure.clone();
            line.paid = old.paid;
            line.reported = old.reported;
        }
        Self::from_lines(self.lines, self.exchange_rate)
    }
}

/// Compute the fee breakdown of a registration.
///
/// Pure: the same registration and configuration always yield the same
/// breakdown. Inactive spouse, trip and accommodation records are ignored.
pub fn calculate_fees(
    details: &RegistrationDetails,
    config: &PricingConfig,
) -> Result<FeeBreakdown, AppError> {
    if config.exchange_rate <= Decimal::ZERO {
        return Err(AppError::ConfigError(anyhow!(
            "Exchange rate must be positive"
        )));
    }

    let pt = &details.participation_type;
    let tax_factor = Decimal::ONE + config.fees_tax_percent / Decimal::ONE_HUNDRED;
    let mut lines = FeeLines::default();

    if !pt.fees {
        lines.participation = taxed_line(pt.price, &pt.currency, config, tax_factor);
    }

    if details.active_spouse().is_some() && !pt.spouse {
        let base = if details.is_jordanian() {
            pt.special_price
        } else {
            pt.spouse_price
        };
        lines.spouse = taxed_line(base, &pt.currency, config, tax_factor);
    }

    let mut trip_total = Decimal::ZERO;
    let mut spouse_trip_total = Decimal::ZERO;
    let has_spouse = details.active_spouse().is_some();
    for booking in details.active_trips() {
        let price = to_usd(booking.trip.price, &booking.trip.currency, config);
        match booking.participant {
            TripParticipant::Registrant if !pt.petra => trip_total += price,
            TripParticipant::Spouse if has_spouse && !pt.petra_spouse => {
                spouse_trip_total += price
            }
            _ => {}
        }
    }
    lines.trip = untaxed_line(trip_total);
    lines.spouse_trip = untaxed_line(spouse_trip_total);

    if details.registration.wants_accommodation_amman && !pt.accommodation_amman {
        if let Some(line) = accommodation_line(details, AccommodationLocation::Amman, config) {
            lines.accommodation_amman = line;
        }
    }
    if details.registration.wants_accommodation_dead_sea && !pt.accommodation_aqaba {
        if let Some(line) = accommodation_line(details, AccommodationLocation::DeadSea, config) {
            lines.accommodation_dead_sea = line;
        }
    }

    let breakdown = FeeBreakdown::from_lines(lines, config.exchange_rate);
    debug!(
        registration_id = %details.registration.id,
        total_usd = %breakdown.total_value_usd,
        "Fees calculated"
    );
    Ok(breakdown)
}

fn taxed_line(
    base: Decimal,
    currency: &str,
    config: &PricingConfig,
    tax_factor: Decimal,
) -> FeeLine {
    let total = round_money(base * tax_factor);
    normalize(
        FeeLine {
            base_amount: base,
            tax_percent: config.fees_tax_percent,
            tax_amount: total - base,
            total,
            currency: currency.to_string(),
            ..FeeLine::default()
        },
        config,
    )
}

fn untaxed_line(total_usd: Decimal) -> FeeLine {
    FeeLine {
        base_amount: total_usd,
        total: total_usd,
        ..FeeLine::default()
    }
}

fn accommodation_line(
    details: &RegistrationDetails,
    location: AccommodationLocation,
    config: &PricingConfig,
) -> Option<FeeLine> {
    let booking = details.active_accommodation(location)?;
    let hotel = &booking.hotel;

    let base = Decimal::from(booking.nights()) * booking.nightly_rate();
    let service = round_money(base * hotel.service_percent / Decimal::ONE_HUNDRED);
    let tax = round_money((base + service) * hotel.tax_percent / Decimal::ONE_HUNDRED);

    Some(normalize(
        FeeLine {
            base_amount: base,
            service_percent: hotel.service_percent,
            service_amount: service,
            tax_percent: hotel.tax_percent,
            tax_amount: tax,
            total: base + service + tax,
            currency: hotel.currency.clone(),
            ..FeeLine::default()
        },
        config,
    ))
}

/// Express a line in USD. Dinar lines have each amount converted on its
/// own, so the converted parts need not add up to the converted total.
fn normalize(mut line: FeeLine, config: &PricingConfig) -> FeeLine {
    if Currency::is_jod(&line.currency) {
        line.base_amount = config.usd_from_jd(line.base_amount);
        line.service_amount = config.usd_from_jd(line.service_amount);
        line.tax_amount = config.usd_from_jd(line.tax_amount);
        line.total = config.usd_from_jd(line.total);
    }
    line.currency = Currency::Usd.as_str().to_string();
    line
}

fn to_usd(amount: Decimal, currency: &str, config: &PricingConfig) -> Decimal {
    if Currency::is_jod(currency) {
        config.usd_from_jd(amount)
    } else {
        amount
    }
}
