use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::domain::{
    CapacitySnapshot, Registration, RegistrationId, RegistrationStatus, Service, UserId,
};

/// Snapshot of one shift and its registration rows, loaded inside a unit of work.
///
/// Rows changed through `stage_insert` / `stage_transition` are tracked so the repository can
/// persist exactly those rows on commit. Dropping a ledger without committing discards them.
#[derive(Debug, Clone)]
pub struct ServiceLedger {
    service: Service,
    version: u64,
    registrations: Vec<Registration>,
    staged: BTreeSet<RegistrationId>,
}

impl ServiceLedger {
    pub fn new(service: Service, version: u64, mut registrations: Vec<Registration>) -> Self {
        registrations.sort_by_key(Registration::queue_key);
        Self {
            service,
            version,
            registrations,
            staged: BTreeSet::new(),
        }
    }

    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Version of the committed state this snapshot was read from.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All rows in queue order, including staged changes.
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn registration_for(&self, user_id: &UserId) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|registration| &registration.user_id == user_id)
    }

    pub fn with_status(&self, status: RegistrationStatus) -> impl Iterator<Item = &Registration> {
        self.registrations
            .iter()
            .filter(move |registration| registration.status == status)
    }

    pub fn occupied_vacancies(&self) -> Result<u32, LedgerError> {
        self.check_rows()?;
        let occupied = self.with_status(RegistrationStatus::Confirmed).count();
        u32::try_from(occupied).map_err(|_| LedgerError::CapacityComputation {
            reason: "confirmed count exceeds u32",
        })
    }

    /// `vacancies - occupied`; negative when a shift is over-subscribed.
    pub fn remaining_vacancies(&self) -> Result<i64, LedgerError> {
        let occupied = self.occupied_vacancies()?;
        Ok(i64::from(self.service.vacancies) - i64::from(occupied))
    }

    pub fn capacity(&self) -> Result<CapacitySnapshot, LedgerError> {
        let occupied = self.occupied_vacancies()?;
        Ok(CapacitySnapshot {
            vacancies: self.service.vacancies,
            occupied,
            remaining: i64::from(self.service.vacancies) - i64::from(occupied),
        })
    }

    /// Waitlisted rows, earliest first.
    pub fn reservation_list(&self) -> Vec<&Registration> {
        self.with_status(RegistrationStatus::Waitlisted).collect()
    }

    /// Head of the waitlist.
    pub fn next_in_queue(&self) -> Option<&Registration> {
        self.with_status(RegistrationStatus::Waitlisted)
            .min_by_key(|registration| registration.queue_key())
    }

    /// Latest creation time on this shift; new rows are never queued ahead of it.
    pub fn latest_registered_at(&self) -> Option<DateTime<Utc>> {
        self.registrations
            .iter()
            .map(|registration| registration.registered_at)
            .max()
    }

    pub fn stage_insert(&mut self, registration: Registration) -> Result<(), LedgerError> {
        if registration.service_id != self.service.id {
            return Err(LedgerError::ForeignRegistration(registration.id));
        }
        if self
            .registrations
            .iter()
            .any(|existing| existing.id == registration.id)
        {
            return Err(LedgerError::DuplicateRegistration(registration.id));
        }

        self.staged.insert(registration.id);
        self.registrations.push(registration);
        self.registrations.sort_by_key(Registration::queue_key);
        Ok(())
    }

    pub fn stage_transition(
        &mut self,
        id: RegistrationId,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> Result<Registration, LedgerError> {
        let registration = self
            .registrations
            .iter_mut()
            .find(|registration| registration.id == id)
            .ok_or(LedgerError::UnknownRegistration(id))?;

        if !registration.status.can_transition_to(next) {
            return Err(LedgerError::IllegalTransition {
                id,
                from: registration.status,
                to: next,
            });
        }

        registration.status = next;
        registration.updated_at = now.max(registration.updated_at);
        self.staged.insert(id);
        Ok(registration.clone())
    }

    pub fn has_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Rows inserted or modified since the snapshot was loaded.
    pub fn staged(&self) -> impl Iterator<Item = &Registration> {
        self.registrations
            .iter()
            .filter(move |registration| self.staged.contains(&registration.id))
    }

    fn check_rows(&self) -> Result<(), LedgerError> {
        if self
            .registrations
            .iter()
            .any(|registration| registration.service_id != self.service.id)
        {
            return Err(LedgerError::CapacityComputation {
                reason: "ledger holds a registration of another shift",
            });
        }
        Ok(())
    }
}

/// Failures inside a ledger. `CapacityComputation` comes from capacity reads; the rest are
/// integrity violations while staging and never occur while the engines are used as intended.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("capacity could not be computed: {reason}")]
    CapacityComputation { reason: &'static str },
    #[error("registration {0} belongs to another shift")]
    ForeignRegistration(RegistrationId),
    #[error("registration {0} is already present")]
    DuplicateRegistration(RegistrationId),
    #[error("registration {0} is not part of this shift")]
    UnknownRegistration(RegistrationId),
    #[error("registration {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: RegistrationId,
        from: RegistrationStatus,
        to: RegistrationStatus,
    },
}
