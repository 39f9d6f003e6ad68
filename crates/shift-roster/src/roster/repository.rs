use super::capacity::ServiceLedger;
use super::domain::{
    NewPeriod, NewService, Period, PeriodDetails, PeriodId, Registration, Service, ServiceId,
    UserId,
};

/// Storage abstraction so the roster service can be exercised in isolation.
///
/// Registration rows are only written through [`RosterRepository::within_service`], which is
/// the unit of work for admissions and cancellations.
pub trait RosterRepository: Send + Sync {
    /// Insert a period together with its initial shifts. Either everything is stored or nothing.
    fn insert_period(
        &self,
        period: NewPeriod,
        services: Vec<NewService>,
    ) -> Result<(Period, Vec<Service>), RepositoryError>;
    fn update_period(&self, id: PeriodId, details: PeriodDetails)
        -> Result<Period, RepositoryError>;
    /// Remove a period, its shifts and all their registrations.
    fn delete_period(&self, id: PeriodId) -> Result<(), RepositoryError>;
    fn fetch_period(&self, id: PeriodId) -> Result<Option<Period>, RepositoryError>;
    /// All periods ordered by start date.
    fn periods(&self) -> Result<Vec<Period>, RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] when the (period, date, start time) slot is taken.
    fn insert_service(
        &self,
        period_id: PeriodId,
        service: NewService,
    ) -> Result<Service, RepositoryError>;
    /// Remove a shift and all its registrations.
    fn delete_service(&self, id: ServiceId) -> Result<(), RepositoryError>;
    fn fetch_service(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError>;
    /// Shifts of one period ordered by date and start time.
    fn services(&self, period_id: PeriodId) -> Result<Vec<Service>, RepositoryError>;

    /// Committed snapshot of a shift's registrations for read-only queries.
    fn ledger(&self, id: ServiceId) -> Result<ServiceLedger, RepositoryError>;
    fn registrations_for_user(&self, user_id: &UserId)
        -> Result<Vec<Registration>, RepositoryError>;

    /// Run `work` against a snapshot of the shift's registrations while holding the shift's
    /// exclusive write lock. Staged rows are committed atomically when `work` returns `Ok`;
    /// on `Err` the snapshot is dropped and nothing is persisted.
    fn within_service<T, E, F>(&self, id: ServiceId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut ServiceLedger) -> Result<T, E>,
        E: From<RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("concurrent write detected")]
    WriteConflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
