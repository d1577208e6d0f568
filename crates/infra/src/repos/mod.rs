pub mod bookings;
pub mod clubs;
pub mod courts;
pub mod instructors;
pub mod price_rules;
pub mod renewal_links;
pub mod slots;
pub mod wallets;

pub use bookings::BookingRepo;
pub use clubs::ClubRepo;
pub use courts::CourtRepo;
pub use instructors::InstructorRepo;
pub use price_rules::PriceRuleRepo;
pub use renewal_links::RenewalLinkRepo;
pub use slots::SlotRepo;
pub use wallets::WalletRepo;
