//! Administrative operations on periods and shifts plus the read models built on top of the
//! registration ledgers.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::capacity::ServiceLedger;
use super::domain::{
    CapacitySnapshot, NewPeriod, NewService, Period, PeriodDetails, PeriodId, Registration,
    RegistrationStatus, Service, ServiceId, ServiceValidation, UserId,
};
use super::repository::{RepositoryError, RosterRepository};
use super::service::{not_found_as, RosterError, RosterService};

/// Shift together with its current capacity.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub service: Service,
    pub capacity: CapacitySnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodOverview {
    pub period: Period,
    pub services: Vec<ServiceSummary>,
}

/// Every registration of one shift split by status.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRoster {
    pub service: Service,
    pub capacity: CapacitySnapshot,
    pub confirmed: Vec<Registration>,
    pub waitlisted: Vec<Registration>,
    pub cancelled: Vec<Registration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRegistration {
    pub service: Service,
    pub registration: Registration,
}

/// Future shift as seen by one user. `user_status` is `None` when the user never applied.
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingService {
    pub service: Service,
    pub capacity: CapacitySnapshot,
    pub user_status: Option<RegistrationStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingPeriod {
    pub period: Period,
    pub services: Vec<UpcomingService>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardService {
    pub service: Service,
    pub confirmed: Vec<Registration>,
    pub waitlisted: Vec<Registration>,
    pub waitlist_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardPeriod {
    pub period: Period,
    pub services: Vec<BoardService>,
}

impl<R> RosterService<R>
where
    R: RosterRepository + 'static,
{
    /// Create a period together with its initial shifts. The request is rejected as a whole
    /// when any shift is invalid or two shifts share a slot.
    pub fn create_period(
        &self,
        period: NewPeriod,
        services: Vec<NewService>,
    ) -> Result<PeriodOverview, RosterError> {
        period.validate()?;
        if services.is_empty() {
            return Err(ServiceValidation::NoShifts.into());
        }

        let window = period.window();
        let mut slots = HashSet::new();
        for service in &services {
            service.validate(&window)?;
            if !slots.insert((service.date, service.time_start)) {
                return Err(RosterError::SlotConflict {
                    date: service.date,
                    time_start: service.time_start,
                });
            }
        }

        // The store reports a clash without naming the slot; the earliest shift stands in for it.
        let earliest = slots.iter().min().copied();
        let (period, services) = self
            .repository
            .insert_period(period, services)
            .map_err(|err| match (err, earliest) {
                (RepositoryError::Conflict, Some((date, time_start))) => {
                    RosterError::SlotConflict { date, time_start }
                }
                (other, _) => RosterError::Repository(other),
            })?;
        info!(period_id = %period.id, shifts = services.len(), "period created");

        let services = services
            .into_iter()
            .map(|service| ServiceSummary {
                capacity: CapacitySnapshot {
                    vacancies: service.vacancies,
                    occupied: 0,
                    remaining: i64::from(service.vacancies),
                },
                service,
            })
            .collect();
        Ok(PeriodOverview { period, services })
    }

    pub fn add_service(
        &self,
        period_id: PeriodId,
        service: NewService,
    ) -> Result<Service, RosterError> {
        let period = self.period(period_id)?;
        service.validate(&period.window())?;

        let (date, time_start) = (service.date, service.time_start);
        let created = self
            .repository
            .insert_service(period_id, service)
            .map_err(|err| match err {
                RepositoryError::Conflict => RosterError::SlotConflict { date, time_start },
                other => not_found_as(other, RosterError::PeriodNotFound(period_id)),
            })?;
        info!(%period_id, service_id = %created.id, "shift added");
        Ok(created)
    }

    /// Only the name and description of a period can change after creation.
    pub fn update_period_details(
        &self,
        period_id: PeriodId,
        details: PeriodDetails,
    ) -> Result<Period, RosterError> {
        details.validate()?;
        self.repository
            .update_period(period_id, details)
            .map_err(|err| not_found_as(err, RosterError::PeriodNotFound(period_id)))
    }

    pub fn delete_period(&self, period_id: PeriodId) -> Result<(), RosterError> {
        self.repository
            .delete_period(period_id)
            .map_err(|err| not_found_as(err, RosterError::PeriodNotFound(period_id)))?;
        info!(%period_id, "period deleted with its shifts and registrations");
        Ok(())
    }

    pub fn delete_service(&self, service_id: ServiceId) -> Result<(), RosterError> {
        self.repository
            .delete_service(service_id)
            .map_err(|err| not_found_as(err, RosterError::ServiceNotFound(service_id)))?;
        info!(%service_id, "shift deleted with its registrations");
        Ok(())
    }

    pub fn periods(&self) -> Result<Vec<Period>, RosterError> {
        Ok(self.repository.periods()?)
    }

    pub fn period(&self, period_id: PeriodId) -> Result<Period, RosterError> {
        self.repository
            .fetch_period(period_id)?
            .ok_or(RosterError::PeriodNotFound(period_id))
    }

    pub fn period_detail(&self, period_id: PeriodId) -> Result<PeriodOverview, RosterError> {
        let period = self.period(period_id)?;
        let services = self
            .repository
            .services(period_id)?
            .into_iter()
            .map(|service| -> Result<ServiceSummary, RosterError> {
                let capacity = self.ledger(service.id)?.capacity()?;
                Ok(ServiceSummary { service, capacity })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PeriodOverview { period, services })
    }

    pub fn service_roster(&self, service_id: ServiceId) -> Result<ServiceRoster, RosterError> {
        let ledger = self.ledger(service_id)?;
        let collect = |status: RegistrationStatus| ledger.with_status(status).cloned().collect::<Vec<_>>();

        Ok(ServiceRoster {
            service: ledger.service().clone(),
            capacity: ledger.capacity()?,
            confirmed: collect(RegistrationStatus::Confirmed),
            waitlisted: collect(RegistrationStatus::Waitlisted),
            cancelled: collect(RegistrationStatus::Cancelled),
        })
    }

    /// The user's registrations ordered by shift date and start time.
    pub fn user_registrations(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<UserRegistration>, RosterError> {
        let mut entries = Vec::new();
        for registration in self.repository.registrations_for_user(user_id)? {
            // A shift deleted after the lookup simply drops out of the listing.
            if let Some(service) = self.repository.fetch_service(registration.service_id)? {
                entries.push(UserRegistration {
                    service,
                    registration,
                });
            }
        }
        entries.sort_by_key(|entry| {
            (
                entry.service.date,
                entry.service.time_start,
                entry.registration.id,
            )
        });
        Ok(entries)
    }

    /// Shifts dated `today` or later, grouped by period in start-date order.
    pub fn upcoming_services(
        &self,
        user_id: &UserId,
        today: NaiveDate,
    ) -> Result<Vec<UpcomingPeriod>, RosterError> {
        let statuses: BTreeMap<ServiceId, RegistrationStatus> = self
            .repository
            .registrations_for_user(user_id)?
            .into_iter()
            .map(|registration| (registration.service_id, registration.status))
            .collect();

        let mut grouped = Vec::new();
        for period in self.repository.periods()? {
            let mut services = Vec::new();
            for service in self.repository.services(period.id)? {
                if service.date < today {
                    continue;
                }
                let Some(ledger) = self.optional_ledger(service.id)? else {
                    continue;
                };
                services.push(UpcomingService {
                    capacity: ledger.capacity()?,
                    user_status: statuses.get(&service.id).copied(),
                    service,
                });
            }
            if !services.is_empty() {
                grouped.push(UpcomingPeriod { period, services });
            }
        }
        Ok(grouped)
    }

    /// Periods newest first with each shift's confirmed list and the head of its waitlist.
    pub fn roster_board(&self) -> Result<Vec<BoardPeriod>, RosterError> {
        let limit = self.board_waitlist_limit;
        let mut board = Vec::new();
        for period in self.repository.periods()?.into_iter().rev() {
            let mut services = Vec::new();
            for service in self.repository.services(period.id)? {
                let Some(ledger) = self.optional_ledger(service.id)? else {
                    continue;
                };
                let waitlist = ledger.reservation_list();
                services.push(BoardService {
                    confirmed: ledger
                        .with_status(RegistrationStatus::Confirmed)
                        .cloned()
                        .collect(),
                    waitlisted: waitlist.iter().take(limit).map(|&row| row.clone()).collect(),
                    waitlist_total: waitlist.len(),
                    service,
                });
            }
            board.push(BoardPeriod { period, services });
        }
        Ok(board)
    }

    fn optional_ledger(&self, service_id: ServiceId) -> Result<Option<ServiceLedger>, RosterError> {
        match self.repository.ledger(service_id) {
            Ok(ledger) => Ok(Some(ledger)),
            Err(RepositoryError::NotFound) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }
}
