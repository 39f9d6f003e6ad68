use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::capacity::ServiceLedger;
use super::domain::{
    NewPeriod, NewService, Period, PeriodDetails, PeriodId, Registration, RegistrationId,
    Service, ServiceId, UserId,
};
use super::repository::{RepositoryError, RosterRepository};

#[derive(Debug, Default)]
struct RosterTables {
    periods: BTreeMap<PeriodId, Period>,
    services: BTreeMap<ServiceId, StoredService>,
    registrations: BTreeMap<RegistrationId, Registration>,
}

type LockMap = HashMap<ServiceId, Arc<Mutex<()>>>;

#[derive(Debug, Clone)]
struct StoredService {
    service: Service,
    version: u64,
}

impl RosterTables {
    fn slot_taken(&self, candidate: &Service) -> bool {
        self.services
            .values()
            .any(|stored| stored.service.slot() == candidate.slot())
    }

    fn drop_services(&mut self, doomed: &[ServiceId]) {
        self.services.retain(|id, _| !doomed.contains(id));
        self.registrations
            .retain(|_, registration| !doomed.contains(&registration.service_id));
    }
}

/// Process-local roster store.
///
/// Each shift has its own write lock so admissions and cancellations on one shift are
/// serialized while other shifts proceed in parallel. Commits additionally check the shift's
/// version and the (service, user) uniqueness constraint before touching any row.
#[derive(Default, Clone)]
pub struct InMemoryRosterRepository {
    tables: Arc<RwLock<RosterTables>>,
    service_locks: Arc<Mutex<LockMap>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryRosterRepository {
    fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RosterTables>, RepositoryError> {
        self.tables
            .read()
            .map_err(|_| RepositoryError::Unavailable("roster tables poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RosterTables>, RepositoryError> {
        self.tables
            .write()
            .map_err(|_| RepositoryError::Unavailable("roster tables poisoned".to_string()))
    }

    /// Lock map guard. Always taken before the tables, never while holding them.
    fn locks(&self) -> Result<MutexGuard<'_, LockMap>, RepositoryError> {
        self.service_locks
            .lock()
            .map_err(|_| RepositoryError::Unavailable("service locks poisoned".to_string()))
    }

    /// Lock entries exist only for stored shifts; unknown ids never allocate one.
    fn service_lock(&self, id: ServiceId) -> Result<Arc<Mutex<()>>, RepositoryError> {
        self.locks()?
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    fn commit(&self, ledger: &ServiceLedger) -> Result<(), RepositoryError> {
        let mut tables = self.write()?;
        let service_id = ledger.service().id;

        let version = tables
            .services
            .get(&service_id)
            .map(|stored| stored.version)
            .ok_or(RepositoryError::NotFound)?;
        if version != ledger.version() {
            return Err(RepositoryError::WriteConflict);
        }

        for row in ledger.staged() {
            let duplicate = tables.registrations.values().any(|existing| {
                existing.id != row.id
                    && existing.service_id == row.service_id
                    && existing.user_id == row.user_id
            });
            if duplicate {
                return Err(RepositoryError::Conflict);
            }
        }

        for row in ledger.staged() {
            tables.registrations.insert(row.id, row.clone());
        }
        if let Some(stored) = tables.services.get_mut(&service_id) {
            stored.version += 1;
        }
        Ok(())
    }
}

impl RosterRepository for InMemoryRosterRepository {
    fn insert_period(
        &self,
        period: NewPeriod,
        services: Vec<NewService>,
    ) -> Result<(Period, Vec<Service>), RepositoryError> {
        let mut locks = self.locks()?;
        let mut tables = self.write()?;
        let now = Utc::now();
        let stored = Period {
            id: PeriodId(self.next_id()),
            name: period.name,
            date_start: period.date_start,
            date_end: period.date_end,
            description: period.description,
            created_at: now,
            updated_at: now,
        };

        let mut created: Vec<Service> = Vec::with_capacity(services.len());
        for service in services {
            let candidate = Service {
                id: ServiceId(self.next_id()),
                period_id: stored.id,
                date: service.date,
                time_start: service.time_start,
                time_end: service.time_end,
                vacancies: service.vacancies,
            };
            if created
                .iter()
                .any(|existing| existing.slot() == candidate.slot())
            {
                return Err(RepositoryError::Conflict);
            }
            created.push(candidate);
        }

        tables.periods.insert(stored.id, stored.clone());
        for service in &created {
            tables.services.insert(
                service.id,
                StoredService {
                    service: service.clone(),
                    version: 0,
                },
            );
            locks.insert(service.id, Arc::default());
        }
        Ok((stored, created))
    }

    fn update_period(
        &self,
        id: PeriodId,
        details: PeriodDetails,
    ) -> Result<Period, RepositoryError> {
        let mut tables = self.write()?;
        let period = tables.periods.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        period.name = details.name;
        period.description = details.description;
        period.updated_at = Utc::now();
        Ok(period.clone())
    }

    fn delete_period(&self, id: PeriodId) -> Result<(), RepositoryError> {
        let mut locks = self.locks()?;
        let mut tables = self.write()?;
        tables
            .periods
            .remove(&id)
            .ok_or(RepositoryError::NotFound)?;

        let doomed: Vec<ServiceId> = tables
            .services
            .values()
            .filter(|stored| stored.service.period_id == id)
            .map(|stored| stored.service.id)
            .collect();
        tables.drop_services(&doomed);
        locks.retain(|service_id, _| !doomed.contains(service_id));
        Ok(())
    }

    fn fetch_period(&self, id: PeriodId) -> Result<Option<Period>, RepositoryError> {
        Ok(self.read()?.periods.get(&id).cloned())
    }

    fn periods(&self) -> Result<Vec<Period>, RepositoryError> {
        let mut periods: Vec<Period> = self.read()?.periods.values().cloned().collect();
        periods.sort_by_key(|period| (period.date_start, period.id));
        Ok(periods)
    }

    fn insert_service(
        &self,
        period_id: PeriodId,
        service: NewService,
    ) -> Result<Service, RepositoryError> {
        let mut locks = self.locks()?;
        let mut tables = self.write()?;
        if !tables.periods.contains_key(&period_id) {
            return Err(RepositoryError::NotFound);
        }

        let candidate = Service {
            id: ServiceId(self.next_id()),
            period_id,
            date: service.date,
            time_start: service.time_start,
            time_end: service.time_end,
            vacancies: service.vacancies,
        };
        if tables.slot_taken(&candidate) {
            return Err(RepositoryError::Conflict);
        }

        tables.services.insert(
            candidate.id,
            StoredService {
                service: candidate.clone(),
                version: 0,
            },
        );
        locks.insert(candidate.id, Arc::default());
        Ok(candidate)
    }

    fn delete_service(&self, id: ServiceId) -> Result<(), RepositoryError> {
        let mut locks = self.locks()?;
        let mut tables = self.write()?;
        if !tables.services.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        tables.drop_services(&[id]);
        locks.remove(&id);
        Ok(())
    }

    fn fetch_service(&self, id: ServiceId) -> Result<Option<Service>, RepositoryError> {
        Ok(self
            .read()?
            .services
            .get(&id)
            .map(|stored| stored.service.clone()))
    }

    fn services(&self, period_id: PeriodId) -> Result<Vec<Service>, RepositoryError> {
        let mut services: Vec<Service> = self
            .read()?
            .services
            .values()
            .filter(|stored| stored.service.period_id == period_id)
            .map(|stored| stored.service.clone())
            .collect();
        services.sort_by_key(|service| (service.date, service.time_start));
        Ok(services)
    }

    fn ledger(&self, id: ServiceId) -> Result<ServiceLedger, RepositoryError> {
        let tables = self.read()?;
        let stored = tables.services.get(&id).ok_or(RepositoryError::NotFound)?;
        let rows = tables
            .registrations
            .values()
            .filter(|registration| registration.service_id == id)
            .cloned()
            .collect();
        Ok(ServiceLedger::new(
            stored.service.clone(),
            stored.version,
            rows,
        ))
    }

    fn registrations_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Registration>, RepositoryError> {
        Ok(self
            .read()?
            .registrations
            .values()
            .filter(|registration| &registration.user_id == user_id)
            .cloned()
            .collect())
    }

    fn within_service<T, E, F>(&self, id: ServiceId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut ServiceLedger) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let lock = self.service_lock(id)?;
        let _guard = lock
            .lock()
            .map_err(|_| RepositoryError::Unavailable("service lock poisoned".to_string()))?;

        let mut ledger = self.ledger(id)?;
        let value = work(&mut ledger)?;
        if ledger.has_changes() {
            self.commit(&ledger)?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::domain::RegistrationStatus;
    use chrono::{NaiveDate, NaiveTime};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).expect("valid date")
    }

    fn time(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 0, 0).expect("valid time")
    }

    fn seeded() -> (InMemoryRosterRepository, Service) {
        let repository = InMemoryRosterRepository::default();
        let (_, services) = repository
            .insert_period(
                NewPeriod {
                    name: "March".to_string(),
                    date_start: date(1),
                    date_end: date(31),
                    description: None,
                },
                vec![NewService {
                    date: date(3),
                    time_start: time(8),
                    time_end: time(14),
                    vacancies: 2,
                }],
            )
            .expect("period stored");
        let service = services.into_iter().next().expect("one shift");
        (repository, service)
    }

    fn row(id: u64, service: &Service, user: &str) -> Registration {
        let now = Utc::now();
        Registration {
            id: RegistrationId(id),
            service_id: service.id,
            user_id: UserId(user.to_string()),
            status: RegistrationStatus::Confirmed,
            registered_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn failed_work_discards_staged_rows() {
        let (repository, service) = seeded();

        let result: Result<(), RepositoryError> = repository.within_service(service.id, |ledger| {
            ledger
                .stage_insert(row(900, &service, "ana"))
                .expect("stage insert");
            Err(RepositoryError::Unavailable("boom".to_string()))
        });

        assert!(result.is_err());
        let ledger = repository.ledger(service.id).expect("ledger");
        assert!(ledger.registrations().is_empty());
        assert_eq!(ledger.version(), 0);
    }

    #[test]
    fn commit_bumps_version_and_persists_rows() {
        let (repository, service) = seeded();

        repository
            .within_service(service.id, |ledger| {
                ledger.stage_insert(row(901, &service, "ana")).map_err(|err| {
                    RepositoryError::Unavailable(err.to_string())
                })
            })
            .expect("commit succeeds");

        let ledger = repository.ledger(service.id).expect("ledger");
        assert_eq!(ledger.registrations().len(), 1);
        assert_eq!(ledger.version(), 1);
    }

    #[test]
    fn duplicate_user_rejected_at_commit() {
        let (repository, service) = seeded();
        repository
            .within_service(service.id, |ledger| {
                ledger
                    .stage_insert(row(902, &service, "ana"))
                    .map_err(|err| RepositoryError::Unavailable(err.to_string()))
            })
            .expect("first insert");

        let result = repository.within_service(service.id, |ledger| {
            // Bypass the engine check to exercise the storage constraint.
            let mut blind = ServiceLedger::new(ledger.service().clone(), ledger.version(), Vec::new());
            blind
                .stage_insert(row(903, &service, "ana"))
                .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
            *ledger = blind;
            Ok::<_, RepositoryError>(())
        });

        assert_eq!(result, Err(RepositoryError::Conflict));
        assert_eq!(
            repository
                .ledger(service.id)
                .expect("ledger")
                .registrations()
                .len(),
            1
        );
    }

    #[test]
    fn stale_snapshot_is_a_write_conflict() {
        let (repository, service) = seeded();
        let stale = repository.ledger(service.id).expect("ledger");

        repository
            .within_service(service.id, |ledger| {
                ledger
                    .stage_insert(row(904, &service, "ana"))
                    .map_err(|err| RepositoryError::Unavailable(err.to_string()))
            })
            .expect("insert");

        let mut stale = stale;
        stale
            .stage_insert(row(905, &service, "bia"))
            .expect("stage");
        assert_eq!(repository.commit(&stale), Err(RepositoryError::WriteConflict));
    }

    #[test]
    fn duplicate_slot_is_a_conflict() {
        let (repository, service) = seeded();
        let result = repository.insert_service(
            service.period_id,
            NewService {
                date: service.date,
                time_start: service.time_start,
                time_end: time(20),
                vacancies: 1,
            },
        );
        assert_eq!(result, Err(RepositoryError::Conflict));
    }

    fn lock_entries(repository: &InMemoryRosterRepository) -> usize {
        repository.service_locks.lock().expect("lock map").len()
    }

    #[test]
    fn unknown_shifts_never_allocate_locks() {
        let (repository, service) = seeded();
        assert_eq!(lock_entries(&repository), 1);

        for offset in 0..1_000 {
            let result: Result<(), RepositoryError> =
                repository.within_service(ServiceId(1_000_000 + offset), |_| Ok(()));
            assert_eq!(result, Err(RepositoryError::NotFound));
        }

        assert_eq!(lock_entries(&repository), 1);
        repository.delete_service(service.id).expect("delete shift");
        assert_eq!(lock_entries(&repository), 0);
    }

    #[test]
    fn poisoned_lock_map_reports_unavailable() {
        let (repository, service) = seeded();
        let locks = repository.service_locks.clone();
        let poisoned = std::thread::spawn(move || {
            let _guard = locks.lock().expect("lock map");
            panic!("poison the lock map");
        })
        .join();
        assert!(poisoned.is_err());

        assert!(matches!(
            repository.delete_service(service.id),
            Err(RepositoryError::Unavailable(_))
        ));
        assert!(repository.fetch_service(service.id).expect("read").is_some());
    }

    #[test]
    fn deleting_period_cascades() {
        let (repository, service) = seeded();
        repository
            .within_service(service.id, |ledger| {
                ledger
                    .stage_insert(row(906, &service, "ana"))
                    .map_err(|err| RepositoryError::Unavailable(err.to_string()))
            })
            .expect("insert");

        repository
            .delete_period(service.period_id)
            .expect("delete period");

        assert_eq!(repository.fetch_service(service.id), Ok(None));
        assert_eq!(
            repository.registrations_for_user(&UserId("ana".to_string())),
            Ok(Vec::new())
        );
        assert_eq!(
            repository.ledger(service.id).map(|_| ()),
            Err(RepositoryError::NotFound)
        );
        assert_eq!(lock_entries(&repository), 0);
    }
}
