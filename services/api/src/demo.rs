use chrono::{Duration, Local, NaiveDate, NaiveTime};
use clap::Args;
use shift_roster::error::AppError;
use shift_roster::roster::{
    Admission, CapacitySnapshot, InMemoryRosterRepository, NewPeriod, NewService,
    PromotionOutcome, ReservationEntry, RosterError, RosterService, Service, UserId,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Seats offered by the demo shift
    #[arg(long, default_value_t = 1)]
    pub(crate) vacancies: u32,
    /// Number of volunteers applying, in order
    #[arg(long, default_value_t = 3)]
    pub(crate) applicants: u32,
    /// Shift date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: Option<NaiveDate>,
}

/// Everything the demo observed, in the order it happened.
#[derive(Debug)]
pub(crate) struct DemoTranscript {
    pub(crate) service: Service,
    pub(crate) admissions: Vec<Admission>,
    pub(crate) after_applications: CapacitySnapshot,
    pub(crate) cancellation: Option<PromotionOutcome>,
    pub(crate) reservations: Vec<ReservationEntry>,
    pub(crate) after_cancellation: CapacitySnapshot,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let date = args.date.unwrap_or_else(|| Local::now().date_naive());
    let transcript = run_scenario(args.vacancies, args.applicants, date)?;
    render(&transcript);
    Ok(())
}

pub(crate) fn run_scenario(
    vacancies: u32,
    applicants: u32,
    date: NaiveDate,
) -> Result<DemoTranscript, RosterError> {
    let roster = RosterService::new(Arc::new(InMemoryRosterRepository::default()));
    let overview = roster.create_period(
        NewPeriod {
            name: "Demo week".to_string(),
            date_start: date,
            date_end: date + Duration::days(6),
            description: Some("Generated by the demo command".to_string()),
        },
        vec![NewService {
            date,
            time_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            time_end: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default(),
            vacancies,
        }],
    )?;
    let service = match overview.services.into_iter().next() {
        Some(summary) => summary.service,
        None => return Err(RosterError::PeriodNotFound(overview.period.id)),
    };

    let volunteers: Vec<UserId> = (1..=applicants)
        .map(|n| UserId(format!("volunteer-{n}")))
        .collect();
    let admissions = volunteers
        .iter()
        .map(|volunteer| roster.apply(service.id, volunteer))
        .collect::<Result<Vec<_>, _>>()?;
    let after_applications = roster.capacity(service.id)?;

    let cancellation = match volunteers.first() {
        Some(first) => Some(roster.cancel(service.id, first)?),
        None => None,
    };

    Ok(DemoTranscript {
        reservations: roster.list_reservations(service.id)?,
        after_cancellation: roster.capacity(service.id)?,
        service,
        admissions,
        after_applications,
        cancellation,
    })
}

fn render(transcript: &DemoTranscript) {
    let service = &transcript.service;
    println!("Shift roster demo");
    println!(
        "Shift {} on {} with {} vacancies",
        service.id,
        service.schedule_label(),
        service.vacancies
    );

    println!("\nApplications");
    for admission in &transcript.admissions {
        println!(
            "- {} [{}] {}",
            admission.registration.user_id,
            admission.registration.status,
            admission.message
        );
    }
    print_capacity(&transcript.after_applications);

    match &transcript.cancellation {
        Some(outcome) => {
            println!(
                "\n{} cancelled (was {})",
                outcome.cancelled.user_id, outcome.previous_status
            );
            match outcome.promoted_user() {
                Some(promoted) => println!("- {promoted} promoted from the waitlist"),
                None => println!("- nobody promoted"),
            }
        }
        None => println!("\nNo applicants, nothing to cancel"),
    }

    if transcript.reservations.is_empty() {
        println!("\nWaitlist: empty");
    } else {
        println!("\nWaitlist");
        for (position, entry) in transcript.reservations.iter().enumerate() {
            println!(
                "{}. {} (since {})",
                position + 1,
                entry.user_id,
                entry.registered_at.format("%H:%M:%S%.3f")
            );
        }
    }
    print_capacity(&transcript.after_cancellation);
}

fn print_capacity(capacity: &CapacitySnapshot) {
    println!(
        "Capacity: {} of {} seats taken, {} remaining",
        capacity.occupied, capacity.vacancies, capacity.remaining
    );
}
