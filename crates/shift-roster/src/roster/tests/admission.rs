use super::common::*;
use crate::roster::admission::{admission_message, admit, Placement};
use crate::roster::domain::{RegistrationStatus, ServiceId};
use crate::roster::repository::RosterRepository;
use crate::roster::service::RosterError;
use std::thread;

#[test]
fn first_applicant_is_confirmed_while_seats_remain() {
    let (roster, _) = build_service();
    let shift = seeded_shift(&roster, 2);

    let admission = roster.apply(shift.id, &user("ana")).expect("apply succeeds");

    assert_eq!(admission.registration.status, RegistrationStatus::Confirmed);
    assert!(admission.message.contains("CONFIRMED"));
    assert!(admission.message.contains("03/03/25"));
    let capacity = roster.capacity(shift.id).expect("capacity");
    assert_eq!((capacity.occupied, capacity.remaining), (1, 1));
}

#[test]
fn applicant_is_waitlisted_once_full() {
    let (roster, _) = build_service();
    let shift = seeded_shift(&roster, 1);
    roster.apply(shift.id, &user("ana")).expect("first apply");

    let admission = roster.apply(shift.id, &user("bruno")).expect("second apply");

    assert_eq!(admission.registration.status, RegistrationStatus::Waitlisted);
    assert!(admission.message.contains("WAITLIST"));
    let reservations = roster.list_reservations(shift.id).expect("reservations");
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].user_id, user("bruno"));
}

#[test]
fn second_apply_is_rejected_without_state_change() {
    let (roster, repository) = build_service();
    let shift = seeded_shift(&roster, 1);
    roster.apply(shift.id, &user("ana")).expect("first apply");
    let before = repository.ledger(shift.id).expect("ledger");

    match roster.apply(shift.id, &user("ana")) {
        Err(RosterError::AlreadyRegistered { service_id, user_id }) => {
            assert_eq!(service_id, shift.id);
            assert_eq!(user_id, user("ana"));
        }
        other => panic!("expected already registered, got {other:?}"),
    }

    let after = repository.ledger(shift.id).expect("ledger");
    assert_eq!(before.registrations(), after.registrations());
    assert_eq!(before.version(), after.version());
}

#[test]
fn cancelled_user_cannot_reapply() {
    let (roster, _) = build_service();
    let shift = seeded_shift(&roster, 1);
    roster.apply(shift.id, &user("ana")).expect("apply");
    roster.cancel(shift.id, &user("ana")).expect("cancel");

    assert!(matches!(
        roster.apply(shift.id, &user("ana")),
        Err(RosterError::AlreadyRegistered { .. })
    ));
    let registration = roster
        .registration(shift.id, &user("ana"))
        .expect("lookup")
        .expect("row kept");
    assert_eq!(registration.status, RegistrationStatus::Cancelled);
}

#[test]
fn apply_to_unknown_shift_is_not_found() {
    let (roster, _) = build_service();

    assert!(matches!(
        roster.apply(ServiceId(404), &user("ana")),
        Err(RosterError::ServiceNotFound(ServiceId(404)))
    ));
}

#[test]
fn occupancy_never_exceeds_vacancies() {
    let (roster, _) = build_service();
    let shift = seeded_shift(&roster, 3);

    for index in 0..10 {
        roster
            .apply(shift.id, &user(&format!("agent-{index}")))
            .expect("apply");
        let capacity = roster.capacity(shift.id).expect("capacity");
        assert!(capacity.occupied <= capacity.vacancies);
    }

    let capacity = roster.capacity(shift.id).expect("capacity");
    assert_eq!(capacity.occupied, 3);
    assert_eq!(capacity.remaining, 0);
    assert_eq!(roster.list_reservations(shift.id).expect("queue").len(), 7);
}

#[test]
fn waitlist_follows_application_order() {
    let (roster, _) = build_service();
    let shift = seeded_shift(&roster, 1);

    for name in ["ana", "bruno", "carla", "davi"] {
        roster.apply(shift.id, &user(name)).expect("apply");
    }

    let queue = roster.list_reservations(shift.id).expect("queue");
    let names: Vec<&str> = queue.iter().map(|entry| entry.user_id.0.as_str()).collect();
    assert_eq!(names, ["bruno", "carla", "davi"]);
    assert!(queue
        .windows(2)
        .all(|pair| (pair[0].registered_at, pair[0].registration_id)
            < (pair[1].registered_at, pair[1].registration_id)));
}

#[test]
fn concurrent_applicants_race_for_last_seat() {
    let (roster, _) = build_service();
    let shift = seeded_shift(&roster, 1);

    let statuses: Vec<RegistrationStatus> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|index| {
                let roster = &roster;
                scope.spawn(move || {
                    roster
                        .apply(shift.id, &user(&format!("racer-{index}")))
                        .expect("apply")
                        .registration
                        .status
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .collect()
    });

    let confirmed = statuses
        .iter()
        .filter(|status| **status == RegistrationStatus::Confirmed)
        .count();
    assert_eq!(confirmed, 1);
    assert_eq!(roster.capacity(shift.id).expect("capacity").remaining, 0);
    assert_eq!(roster.list_reservations(shift.id).expect("queue").len(), 7);
}

#[test]
fn admit_stages_the_row_and_words_the_message_by_placement() {
    let (roster, repository) = build_service();
    let shift = seeded_shift(&roster, 1);
    let mut ledger = repository.ledger(shift.id).expect("ledger");

    let first = admit(&mut ledger, &user("ana"), chrono::Utc::now()).expect("admitted");
    let second = admit(&mut ledger, &user("bruno"), chrono::Utc::now()).expect("admitted");

    assert_eq!(first.registration.status, RegistrationStatus::Confirmed);
    assert_eq!(first.message, admission_message(&shift, Placement::Confirmed));
    assert_eq!(second.registration.status, RegistrationStatus::Waitlisted);
    assert_eq!(second.message, admission_message(&shift, Placement::Waitlisted));
    assert_eq!(ledger.staged().count(), 2);
}
