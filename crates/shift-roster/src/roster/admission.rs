use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use super::capacity::ServiceLedger;
use super::domain::{
    Admission, Registration, RegistrationId, RegistrationStatus, Service, UserId,
};
use super::service::RosterError;

static REGISTRATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_registration_id() -> RegistrationId {
    RegistrationId(REGISTRATION_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// Outcome of an admission decision. Cancellation is never an admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Confirmed,
    Waitlisted,
}

impl Placement {
    fn status(self) -> RegistrationStatus {
        match self {
            Placement::Confirmed => RegistrationStatus::Confirmed,
            Placement::Waitlisted => RegistrationStatus::Waitlisted,
        }
    }
}

/// Stage a new registration for `user_id`: CONFIRMED while seats remain, WAITLISTED otherwise.
///
/// Must run inside the shift's unit of work so the capacity read and the insert are atomic.
pub(crate) fn admit(
    ledger: &mut ServiceLedger,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<Admission, RosterError> {
    let service_id = ledger.service().id;
    if ledger.registration_for(user_id).is_some() {
        return Err(RosterError::AlreadyRegistered {
            service_id,
            user_id: user_id.clone(),
        });
    }

    let placement = if ledger.remaining_vacancies()? > 0 {
        Placement::Confirmed
    } else {
        Placement::Waitlisted
    };

    // Never queue behind a row whose timestamp is later than ours.
    let registered_at = ledger
        .latest_registered_at()
        .map_or(now, |latest| latest.max(now));

    let registration = Registration {
        id: next_registration_id(),
        service_id,
        user_id: user_id.clone(),
        status: placement.status(),
        registered_at,
        updated_at: registered_at,
    };
    ledger.stage_insert(registration.clone())?;
    Ok(Admission {
        message: admission_message(ledger.service(), placement),
        registration,
    })
}

pub(crate) fn admission_message(service: &Service, placement: Placement) -> String {
    match placement {
        Placement::Confirmed => format!(
            "Congratulations! You are CONFIRMED for the shift on {}.",
            service.schedule_label()
        ),
        Placement::Waitlisted => format!(
            "All vacancies are taken. You joined the WAITLIST for the shift on {}.",
            service.schedule_label()
        ),
    }
}
