use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use crate::roster::capacity::ServiceLedger;
use crate::roster::domain::{
    NewPeriod, NewService, Period, PeriodDetails, PeriodId, Registration, Service, ServiceId,
    UserId,
};
use crate::roster::memory::InMemoryRosterRepository;
use crate::roster::repository::{RepositoryError, RosterRepository};
use crate::roster::service::RosterService;

pub(super) fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
}

pub(super) fn time(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).expect("valid time")
}

pub(super) fn user(name: &str) -> UserId {
    UserId(name.to_string())
}

pub(super) fn march() -> NewPeriod {
    NewPeriod {
        name: "March on-call".to_string(),
        date_start: date(1),
        date_end: date(31),
        description: Some("Weekend coverage".to_string()),
    }
}

pub(super) fn shift(day: u32, start: u32, vacancies: u32) -> NewService {
    NewService {
        date: date(day),
        time_start: time(start),
        time_end: time(start + 6),
        vacancies,
    }
}

pub(super) fn build_service() -> (
    RosterService<InMemoryRosterRepository>,
    Arc<InMemoryRosterRepository>,
) {
    let repository = Arc::new(InMemoryRosterRepository::default());
    let service = RosterService::new(repository.clone());
    (service, repository)
}

/// Create a period with a single shift offering `vacancies` seats.
pub(super) fn seeded_shift<R>(roster: &RosterService<R>, vacancies: u32) -> Service
where
    R: RosterRepository + 'static,
{
    let overview = roster
        .create_period(march(), vec![shift(3, 8, vacancies)])
        .expect("period created");
    overview
        .services
        .into_iter()
        .next()
        .expect("one shift")
        .service
}

/// Repository wrapper that injects write conflicts or refuses to commit.
#[derive(Default)]
pub(super) struct FlakyRepository {
    pub(super) inner: InMemoryRosterRepository,
    pub(super) conflicts: AtomicUsize,
    pub(super) fail_commits: AtomicBool,
    pub(super) slot_clashes: AtomicBool,
    pub(super) attempts: AtomicUsize,
}

impl FlakyRepository {
    pub(super) fn inject_conflicts(&self, count: usize) {
        self.conflicts.store(count, Ordering::SeqCst);
    }

    pub(super) fn refuse_commits(&self, refuse: bool) {
        self.fail_commits.store(refuse, Ordering::SeqCst);
    }

    pub(super) fn clash_on_insert(&self, clash: bool) {
        self.slot_clashes.store(clash, Ordering::SeqCst);
    }

    pub(super) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl RosterRepository for FlakyRepository {
    fn insert_period(
        &self,
        period: NewPeriod,
        services: Vec<NewService>,
    ) -> Result<(Period, Vec<Service>), RepositoryError> {
        if self.slot_clashes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Conflict);
        }
        self.inner.insert_period(period, services)
    }

    fn update_period(
        &self,
        id: PeriodId,
        details: PeriodDetails,
    ) -> Result<Period, RepositoryError> {
        self.inner.update_period(id, details)
    }

    fn delete_period(&self, id: PeriodId) -> Result<(), RepositoryError> {
        self.inner.delete_period(id)
    }

    fn fetch_period(&self, id: PeriodId) -> Result<Option<Period>, RepositoryError> {
        self.inner.fetch_period(id)
    }

    fn periods(&self) -> Result<Vec<Period>, RepositoryError> {
        self.inner.periods()
    }

    fn insert_service(
        &self,
        period_id: PeriodId,
        service: NewService,
    ) -> Result<Service, RepositoryError> {
        self.inner.insert_service(period_id, service)
    }

    fn delete_service(&self, id: ServiceId) -> Result<(), RepositoryError> {
        self.inner.delete_service(id)
    }

    fn fetch_service(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError> {
        self.inner.fetch_service(id)
    }

    fn services(&self, period_id: PeriodId) -> Result<Vec<Service>, RepositoryError> {
        self.inner.services(period_id)
    }

    fn ledger(&self, id: ServiceId) -> Result<ServiceLedger, RepositoryError> {
        self.inner.ledger(id)
    }

    fn registrations_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Registration>, RepositoryError> {
        self.inner.registrations_for_user(user_id)
    }

    fn within_service<T, E, F>(&self, id: ServiceId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut ServiceLedger) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let pending = self.conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(RepositoryError::WriteConflict.into());
        }

        if self.fail_commits.load(Ordering::SeqCst) {
            let mut ledger = self.inner.ledger(id)?;
            work(&mut ledger)?;
            return Err(RepositoryError::Unavailable("commit refused".to_string()).into());
        }

        self.inner.within_service(id, work)
    }
}

pub(super) fn build_flaky_service() -> (RosterService<FlakyRepository>, Arc<FlakyRepository>) {
    let repository = Arc::new(FlakyRepository::default());
    let service = RosterService::new(repository.clone());
    (service, repository)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
