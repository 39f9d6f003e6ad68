use chrono::{DateTime, Utc};

use super::capacity::ServiceLedger;
use super::domain::{PromotionOutcome, RegistrationStatus, UserId};
use super::service::RosterError;

/// Cancel the user's active registration and, when it held a seat, hand the seat to the head
/// of the waitlist. Both changes are staged on the same ledger and commit together.
pub(crate) fn cancel(
    ledger: &mut ServiceLedger,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<PromotionOutcome, RosterError> {
    let service_id = ledger.service().id;
    let target = ledger
        .registration_for(user_id)
        .filter(|registration| registration.status.is_active())
        .map(|registration| (registration.id, registration.status))
        .ok_or_else(|| RosterError::NotRegistered {
            service_id,
            user_id: user_id.clone(),
        })?;
    let (target_id, previous_status) = target;

    let cancelled = ledger.stage_transition(target_id, RegistrationStatus::Cancelled, now)?;

    let promoted = match previous_status {
        RegistrationStatus::Confirmed => match ledger.next_in_queue().map(|next| next.id) {
            Some(next_id) => {
                Some(ledger.stage_transition(next_id, RegistrationStatus::Confirmed, now)?)
            }
            None => None,
        },
        RegistrationStatus::Waitlisted | RegistrationStatus::Cancelled => None,
    };

    Ok(PromotionOutcome {
        cancelled,
        previous_status,
        promoted,
    })
}
