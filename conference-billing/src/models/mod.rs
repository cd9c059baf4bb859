//! Domain models for conference-billing.

mod company_invoice;
mod invoice;
mod registration;

pub use company_invoice::{CompanyInvoice, CompanyInvoiceStatus, CreateCompanyInvoice};
pub use invoice::{FawaterkomStatus, FeeCategory, FeeLine, FeeLines, Invoice, PaymentSource};
pub use registration::{
    AccommodationBooking, AccommodationLocation, Company, Country, Hotel, HotelRoom,
    ParticipationType, PaymentStatus, Registration, RegistrationDetails, RegistrationStatus,
    RoomType, Spouse, Trip, TripBooking, TripParticipant,
};
