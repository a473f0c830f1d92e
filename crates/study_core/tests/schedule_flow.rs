use chrono::{Duration, NaiveDate, NaiveTime};
use tempfile::tempdir;

use study_core::{Command, Now, ScheduleService};
use study_domain::task::{Task, TaskStatus};

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn fixed_now() -> Now {
    Now::fixed(
        NaiveDate::from_ymd_opt(2025, 11, 3)
            .unwrap()
            .and_time(t(7, 0)),
    )
}

#[test]
fn plan_complete_and_reload_round_trip() {
    let temp = tempdir().expect("tempdir");
    let now = fixed_now();

    let service = ScheduleService::builder()
        .data_dir(temp.path())
        .build()
        .expect("build schedule service");

    let task = Task::new("Write essay", now.local.date() + Duration::days(3), 4.0);
    let report = service
        .dispatch_at(Command::AddTask(task.clone()), now)
        .expect("add task");
    assert!(report.is_valid);

    let plans = service.plans();
    let total: f64 = plans
        .iter()
        .flat_map(|p| p.sessions.iter())
        .filter(|s| s.task_id == task.id)
        .map(|s| s.allocated_hours)
        .sum();
    assert!((total - 4.0).abs() < 1e-9, "all hours placed, got {total}");

    // Finish the first session with measured hours.
    let (date, first) = plans
        .iter()
        .flat_map(|p| p.sessions.iter().map(move |s| (p.date, s.clone())))
        .find(|(_, s)| s.task_id == task.id)
        .expect("first session");
    service
        .dispatch_at(
            Command::CompleteSession {
                date,
                task_id: task.id,
                session_number: first.session_number,
                actual_hours: Some(1.5),
            },
            now,
        )
        .expect("complete session");

    // A fresh service over the same directory sees the same state.
    drop(service);
    let reloaded = ScheduleService::builder()
        .data_dir(temp.path())
        .build()
        .expect("reload schedule service");
    let session = reloaded
        .plan_for(date)
        .and_then(|p| p.find_session(task.id, first.session_number).cloned())
        .expect("persisted session");
    assert!(session.done);
    assert_eq!(session.actual_hours, Some(1.5));
    assert_eq!(
        reloaded.tasks()[0].status,
        TaskStatus::InProgress,
        "one finished session moves the task in progress"
    );
}

#[test]
fn manual_move_survives_settings_regeneration() {
    let temp = tempdir().expect("tempdir");
    let now = fixed_now();
    let service = ScheduleService::builder()
        .data_dir(temp.path())
        .build()
        .expect("build schedule service");

    let task = Task::new("Flashcards", now.local.date() + Duration::days(5), 2.0);
    service
        .dispatch_at(Command::AddTask(task.clone()), now)
        .expect("add task");

    let (from_date, session) = service
        .plans()
        .iter()
        .flat_map(|p| p.sessions.iter().map(move |s| (p.date, s.clone())))
        .find(|(_, s)| s.task_id == task.id)
        .expect("scheduled session");
    let to_date = now.local.date() + Duration::days(4);
    let end = t(19, 0) + Duration::minutes((session.allocated_hours * 60.0) as i64);
    let report = service
        .dispatch_at(
            Command::MoveSession {
                from_date,
                task_id: task.id,
                session_number: session.session_number,
                to_date,
                start: t(19, 0),
                end,
            },
            now,
        )
        .expect("move session");
    assert!(report.can_proceed, "{:?}", report.conflicts);

    // Any settings change rebuilds every plan.
    let mut settings = service.settings();
    settings.daily_available_hours = 3.0;
    service
        .dispatch_at(Command::UpdateSettings(settings), now)
        .expect("update settings");

    let moved = service
        .plan_for(to_date)
        .and_then(|p| p.find_session(task.id, session.session_number).cloned())
        .expect("moved session still on its chosen date");
    assert!(moved.is_manual_override);
    assert_eq!(moved.start_time, t(19, 0));
}

#[test]
fn unknown_targets_are_rejected_before_reducing() {
    let temp = tempdir().expect("tempdir");
    let service = ScheduleService::builder()
        .data_dir(temp.path())
        .build()
        .expect("build schedule service");

    let ghost = Task::new("Ghost", NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(), 1.0);
    let err = service
        .dispatch_at(Command::UpdateTask(ghost), fixed_now())
        .expect_err("unknown task must fail");
    assert!(err.to_string().contains("no task"));
    assert!(service.tasks().is_empty(), "failed dispatch changes nothing");
}
