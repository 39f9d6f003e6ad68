//! Shift registration roster: capacity tracking, confirmed-versus-waitlist admission and
//! first-in-first-out promotion when a confirmed seat is released.

mod admission;
pub mod capacity;
mod cancellation;
pub mod catalog;
pub mod domain;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use capacity::{LedgerError, ServiceLedger};
pub use catalog::{
    BoardPeriod, BoardService, PeriodOverview, ServiceRoster, ServiceSummary, UpcomingPeriod,
    UpcomingService, UserRegistration,
};
pub use domain::{
    Admission, CapacitySnapshot, NewPeriod, NewService, Period, PeriodDetails, PeriodId,
    PeriodValidation, PromotionOutcome, Registration, RegistrationId, RegistrationStatus,
    ReservationEntry, Service, ServiceId, ServiceValidation, UserId,
};
pub use memory::InMemoryRosterRepository;
pub use repository::{RepositoryError, RosterRepository};
pub use router::{roster_router, USER_HEADER};
pub use service::{RosterError, RosterService, DEFAULT_BOARD_WAITLIST_LIMIT};
