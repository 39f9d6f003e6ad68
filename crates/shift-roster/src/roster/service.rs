use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{error, info, warn};

use super::admission::admit;
use super::cancellation;
use super::capacity::{LedgerError, ServiceLedger};
use super::domain::{
    Admission, CapacitySnapshot, PeriodId, PeriodValidation, PromotionOutcome, Registration,
    ReservationEntry, ServiceId, ServiceValidation, UserId,
};
use super::repository::{RepositoryError, RosterRepository};

/// Waitlisted rows shown per shift on the roster board unless configured otherwise.
pub const DEFAULT_BOARD_WAITLIST_LIMIT: usize = 5;

/// Service composing the repository with the admission and cancellation engines.
pub struct RosterService<R> {
    pub(crate) repository: Arc<R>,
    pub(crate) board_waitlist_limit: usize,
}

impl<R> RosterService<R>
where
    R: RosterRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            board_waitlist_limit: DEFAULT_BOARD_WAITLIST_LIMIT,
        }
    }

    pub fn with_board_waitlist_limit(mut self, limit: usize) -> Self {
        self.board_waitlist_limit = limit;
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Register `user_id` on a shift. Confirmed while seats remain, waitlisted otherwise.
    pub fn apply(
        &self,
        service_id: ServiceId,
        user_id: &UserId,
    ) -> Result<Admission, RosterError> {
        let result = self
            .unit_of_work(service_id, "apply", |ledger| admit(ledger, user_id, Utc::now()))
            .map_err(|err| match err {
                RosterError::Repository(RepositoryError::Conflict) => {
                    RosterError::AlreadyRegistered {
                        service_id,
                        user_id: user_id.clone(),
                    }
                }
                other => other,
            });

        match &result {
            Ok(admission) => info!(
                %service_id,
                %user_id,
                status = %admission.registration.status,
                registration_id = %admission.registration.id,
                "registration admitted"
            ),
            Err(err) => log_failure("apply", service_id, user_id, err),
        }
        result
    }

    /// Cancel the user's active registration, promoting the head of the waitlist when a
    /// confirmed seat was released.
    pub fn cancel(
        &self,
        service_id: ServiceId,
        user_id: &UserId,
    ) -> Result<PromotionOutcome, RosterError> {
        let result = self.unit_of_work(service_id, "cancel", |ledger| {
            cancellation::cancel(ledger, user_id, Utc::now())
        });

        match &result {
            Ok(outcome) => info!(
                %service_id,
                %user_id,
                previous_status = %outcome.previous_status,
                promoted = ?outcome.promoted_user(),
                "registration cancelled"
            ),
            Err(err) => log_failure("cancel", service_id, user_id, err),
        }
        result
    }

    /// Waitlisted registrations, earliest first.
    pub fn list_reservations(
        &self,
        service_id: ServiceId,
    ) -> Result<Vec<ReservationEntry>, RosterError> {
        let ledger = self.ledger(service_id)?;
        Ok(ledger
            .reservation_list()
            .into_iter()
            .map(ReservationEntry::from)
            .collect())
    }

    pub fn capacity(&self, service_id: ServiceId) -> Result<CapacitySnapshot, RosterError> {
        Ok(self.ledger(service_id)?.capacity()?)
    }

    pub fn registration(
        &self,
        service_id: ServiceId,
        user_id: &UserId,
    ) -> Result<Option<Registration>, RosterError> {
        Ok(self.ledger(service_id)?.registration_for(user_id).cloned())
    }

    pub(crate) fn ledger(&self, service_id: ServiceId) -> Result<ServiceLedger, RosterError> {
        self.repository
            .ledger(service_id)
            .map_err(|err| not_found_as(err, RosterError::ServiceNotFound(service_id)))
    }

    /// Run `work` in the shift's unit of work, retrying once when the commit reports a
    /// concurrent write.
    fn unit_of_work<T, F>(
        &self,
        service_id: ServiceId,
        operation: &'static str,
        work: F,
    ) -> Result<T, RosterError>
    where
        F: Fn(&mut ServiceLedger) -> Result<T, RosterError>,
    {
        let result = match self.repository.within_service(service_id, &work) {
            Err(RosterError::Repository(RepositoryError::WriteConflict)) => {
                warn!(%service_id, operation, "write conflict on shift, retrying once");
                self.repository.within_service(service_id, &work)
            }
            other => other,
        };

        result.map_err(|err| match err {
            RosterError::Repository(RepositoryError::NotFound) => {
                RosterError::ServiceNotFound(service_id)
            }
            other => other,
        })
    }
}

pub(crate) fn not_found_as(err: RepositoryError, replacement: RosterError) -> RosterError {
    match err {
        RepositoryError::NotFound => replacement,
        other => RosterError::Repository(other),
    }
}

fn log_failure(operation: &'static str, service_id: ServiceId, user_id: &UserId, err: &RosterError) {
    if err.is_user_facing() {
        warn!(%service_id, %user_id, operation, error = %err, "roster request rejected");
    } else {
        error!(%service_id, %user_id, operation, error = %err, "roster operation failed");
    }
}

/// Error raised by the roster service.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("user {user_id} is already registered for shift {service_id}")]
    AlreadyRegistered {
        service_id: ServiceId,
        user_id: UserId,
    },
    #[error("user {user_id} holds no active registration for shift {service_id}")]
    NotRegistered {
        service_id: ServiceId,
        user_id: UserId,
    },
    #[error("a shift already starts at {time_start} on {date} in this period")]
    SlotConflict { date: NaiveDate, time_start: NaiveTime },
    #[error(transparent)]
    CapacityComputation(LedgerError),
    #[error("ledger integrity violated: {0}")]
    LedgerIntegrity(LedgerError),
    #[error("period {0} not found")]
    PeriodNotFound(PeriodId),
    #[error("shift {0} not found")]
    ServiceNotFound(ServiceId),
    #[error(transparent)]
    InvalidPeriod(#[from] PeriodValidation),
    #[error(transparent)]
    InvalidService(#[from] ServiceValidation),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RosterError {
    /// Outcomes reported back to the caller as warnings rather than system failures.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            RosterError::Repository(_) | RosterError::LedgerIntegrity(_)
        )
    }
}

impl From<LedgerError> for RosterError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::CapacityComputation { .. } => RosterError::CapacityComputation(err),
            LedgerError::ForeignRegistration(_)
            | LedgerError::DuplicateRegistration(_)
            | LedgerError::UnknownRegistration(_)
            | LedgerError::IllegalTransition { .. } => RosterError::LedgerIntegrity(err),
        }
    }
}
