use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for staffing periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodId(pub u64);

/// Identifier wrapper for a single shift within a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub u64);

/// Identifier wrapper for registrations. Allocated from a monotonically increasing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegistrationId(pub u64);

/// Identity handed over by the authentication gate. Not owned by the roster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(PeriodId, ServiceId, RegistrationId, UserId);

/// Time-bounded staffing window subdivided into shifts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub name: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Period {
    pub fn window(&self) -> RangeInclusive<NaiveDate> {
        self.date_start..=self.date_end
    }
}

/// Administrator input for a new period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPeriod {
    pub name: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewPeriod {
    pub fn validate(&self) -> Result<(), PeriodValidation> {
        if self.name.trim().is_empty() {
            return Err(PeriodValidation::BlankName);
        }
        if self.date_start > self.date_end {
            return Err(PeriodValidation::EndsBeforeStart {
                date_start: self.date_start,
                date_end: self.date_end,
            });
        }
        Ok(())
    }

    pub fn window(&self) -> RangeInclusive<NaiveDate> {
        self.date_start..=self.date_end
    }
}

/// Descriptive fields that stay editable after a period has shifts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodDetails {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl PeriodDetails {
    pub fn validate(&self) -> Result<(), PeriodValidation> {
        if self.name.trim().is_empty() {
            return Err(PeriodValidation::BlankName);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodValidation {
    #[error("period name must not be blank")]
    BlankName,
    #[error("period ends ({date_end}) before it starts ({date_start})")]
    EndsBeforeStart {
        date_start: NaiveDate,
        date_end: NaiveDate,
    },
}

/// A single shift with a fixed number of seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub period_id: PeriodId,
    pub date: NaiveDate,
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    pub vacancies: u32,
}

impl Service {
    /// Slot key enforcing one shift per (period, date, start time).
    pub fn slot(&self) -> (PeriodId, NaiveDate, NaiveTime) {
        (self.period_id, self.date, self.time_start)
    }

    /// Short label used in user-facing messages, e.g. `03/02/25 from 08:00 to 14:00`.
    pub fn schedule_label(&self) -> String {
        format!(
            "{} from {} to {}",
            self.date.format("%d/%m/%y"),
            self.time_start.format("%H:%M"),
            self.time_end.format("%H:%M")
        )
    }
}

/// Administrator input for a new shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewService {
    pub date: NaiveDate,
    pub time_start: NaiveTime,
    pub time_end: NaiveTime,
    pub vacancies: u32,
}

impl NewService {
    /// Check the shift against the owning period's date window.
    pub fn validate(&self, window: &RangeInclusive<NaiveDate>) -> Result<(), ServiceValidation> {
        if !window.contains(&self.date) {
            return Err(ServiceValidation::OutsidePeriod {
                date: self.date,
                date_start: *window.start(),
                date_end: *window.end(),
            });
        }
        if self.time_start >= self.time_end {
            return Err(ServiceValidation::EndsBeforeStart {
                time_start: self.time_start,
                time_end: self.time_end,
            });
        }
        if self.vacancies == 0 {
            return Err(ServiceValidation::NoVacancies);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceValidation {
    #[error("shift date {date} falls outside the period ({date_start} to {date_end})")]
    OutsidePeriod {
        date: NaiveDate,
        date_start: NaiveDate,
        date_end: NaiveDate,
    },
    #[error("shift ends ({time_end}) before it starts ({time_start})")]
    EndsBeforeStart {
        time_start: NaiveTime,
        time_end: NaiveTime,
    },
    #[error("shift must offer at least one vacancy")]
    NoVacancies,
    #[error("period must contain at least one shift")]
    NoShifts,
}

/// Lifecycle of a registration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Confirmed,
    Waitlisted,
    Cancelled,
}

impl RegistrationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Waitlisted => "waitlisted",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    /// Cancelled rows keep their place in history but hold neither a seat nor a queue slot.
    pub const fn is_active(self) -> bool {
        !matches!(self, RegistrationStatus::Cancelled)
    }

    pub const fn can_transition_to(self, next: RegistrationStatus) -> bool {
        matches!(
            (self, next),
            (RegistrationStatus::Waitlisted, RegistrationStatus::Confirmed)
                | (RegistrationStatus::Waitlisted, RegistrationStatus::Cancelled)
                | (RegistrationStatus::Confirmed, RegistrationStatus::Cancelled)
        )
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A user's single row for a shift. Status changes in place; the row is never re-created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub service_id: ServiceId,
    pub user_id: UserId,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// FIFO key for the waitlist: creation time, then id for identical timestamps.
    pub fn queue_key(&self) -> (DateTime<Utc>, RegistrationId) {
        (self.registered_at, self.id)
    }
}

/// Derived capacity figures for one shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub vacancies: u32,
    pub occupied: u32,
    pub remaining: i64,
}

/// Waitlist entry exposed to callers, earliest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationEntry {
    pub registration_id: RegistrationId,
    pub user_id: UserId,
    pub registered_at: DateTime<Utc>,
}

impl From<&Registration> for ReservationEntry {
    fn from(registration: &Registration) -> Self {
        Self {
            registration_id: registration.id,
            user_id: registration.user_id.clone(),
            registered_at: registration.registered_at,
        }
    }
}

/// Result of a successful application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub registration: Registration,
    pub message: String,
}

/// Result of a successful cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionOutcome {
    pub cancelled: Registration,
    pub previous_status: RegistrationStatus,
    pub promoted: Option<Registration>,
}

impl PromotionOutcome {
    pub fn promoted_user(&self) -> Option<&UserId> {
        self.promoted.as_ref().map(|registration| &registration.user_id)
    }
}
