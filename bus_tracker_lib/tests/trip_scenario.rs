use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bus_tracker_lib::{
    attendance::{AttendanceOutcome, AttendanceStatus, ScheduledStudent},
    motion::MotionConfig,
    position::EndPolicy,
    route::{Route, Stop, StopStatus},
    session::{Role, SessionContext, TripSession},
    telemetry::{REFRESHED_ADDRESSES, DEFAULT_ADDRESS},
    trip::TripState,
    TrackerError,
};
use chrono::NaiveTime;

fn four_stop_route() -> Arc<Route> {
    let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
    Arc::new(
        Route::new(
            "rt-falnir",
            "RT-FALNIR",
            vec![
                Stop::new("A", "Falnir Road", t(7, 30), 12.8698, 74.8430),
                Stop::new("B", "Kankanady", t(7, 42), 12.8725, 74.8562).with_students_count(2),
                Stop::new("C", "Bejai", t(7, 51), 12.8855, 74.8390),
                Stop::new("D", "St. Aloysius School", t(8, 5), 12.8741, 74.8460),
            ],
        )
        .unwrap(),
    )
}

fn students_at_b() -> Vec<ScheduledStudent> {
    ["student1", "student2"]
        .into_iter()
        .map(|id| ScheduledStudent {
            student_id: id.to_string(),
            name: id.to_uppercase(),
            grade: "Grade 5".to_string(),
            stop_id: "B".to_string(),
        })
        .collect()
}

fn driver_session() -> TripSession {
    let config = MotionConfig {
        seed: Some(42),
        end_policy: EndPolicy::StopAtEnd,
        ..MotionConfig::default()
    };
    TripSession::new(SessionContext::new(Role::Driver, "bus-07"), config)
}

#[test]
fn morning_pickup_end_to_end() {
    let mut session = driver_session();

    session.start_trip(four_stop_route(), students_at_b()).unwrap();
    assert_eq!(session.state(), TripState::Active { current_stop_index: 0 });
    assert!(session.records_for_current_stop().is_empty());

    session.advance_stop().unwrap();
    assert_eq!(session.state(), TripState::Active { current_stop_index: 1 });
    assert_eq!(session.status_of(0).unwrap(), StopStatus::Passed);
    assert_eq!(session.status_of(1).unwrap(), StopStatus::Current);
    assert_eq!(session.status_of(2).unwrap(), StopStatus::Upcoming);
    assert_eq!(session.records_for_current_stop().len(), 2);

    let record = session.mark_attendance("student1", AttendanceOutcome::Boarded).unwrap();
    assert_eq!(record.status, AttendanceStatus::Boarded);

    assert_eq!(
        session.mark_attendance("student1", AttendanceOutcome::Absent).unwrap_err(),
        TrackerError::AlreadyRecorded("student1".to_string())
    );
    let first = session
        .records_for_current_stop()
        .into_iter()
        .find(|r| r.student_id == "student1")
        .unwrap();
    assert_eq!(first.status, AttendanceStatus::Boarded);

    session.advance_stop().unwrap();
    assert_eq!(session.advance_stop().unwrap(), TripState::Ended);
    assert!(matches!(session.advance_stop(), Err(TrackerError::InvalidTransition(_))));

    let summary = session.attendance_summary();
    assert_eq!(summary.total, 2);
    assert_eq!(summary.boarded, 1);
    assert_eq!(summary.pending, 1);
}

#[test]
fn attendance_cannot_be_marked_ahead_of_the_bus() {
    let mut session = driver_session();
    session.start_trip(four_stop_route(), students_at_b()).unwrap();

    assert_eq!(
        session.mark_attendance("student2", AttendanceOutcome::Boarded).unwrap_err(),
        TrackerError::UnknownStudent("student2".to_string())
    );

    session.skip_stop().unwrap();
    session.mark_attendance("student2", AttendanceOutcome::Absent).unwrap();
}

#[test]
fn refresh_updates_address_once_while_trip_runs() {
    let mut session = driver_session();
    session.start_trip(four_stop_route(), students_at_b()).unwrap();

    let t0 = Instant::now();
    assert!(session.refresh_telemetry(t0).unwrap());
    assert!(!session.refresh_telemetry(t0 + Duration::from_millis(200)).unwrap());

    let mut now = t0;
    let mut changes = 0;
    let mut address = DEFAULT_ADDRESS.to_string();
    for _ in 0..100 {
        now += Duration::from_millis(50);
        let update = session.tick(now).unwrap();
        if update.telemetry.address != address {
            changes += 1;
            address = update.telemetry.address.clone();
            assert!(now - t0 >= Duration::from_millis(1500));
        }
    }
    assert_eq!(changes, 1);
    assert_eq!(address, REFRESHED_ADDRESSES[0]);
}
