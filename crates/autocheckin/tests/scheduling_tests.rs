//! Planner, scheduler and executor driven directly, one invocation at a time.

use std::sync::Arc;

use autocheckin::{
    CheckInError, CheckInExecutor, Continuation, GatewayError, LookupError, Passenger, Phase,
    Planner, ReservationGateway, RunInput, Scheduler, SchedulerError, StartRun, WorkflowState,
};
use autocheckin_testing::{
    epoch, identity, reservation_departing, FakeGateway, GatewayCall, ManualClock,
};
use chrono::{DateTime, Duration, Utc};

fn components(gateway: &FakeGateway, clock: &ManualClock) -> (Scheduler, CheckInExecutor) {
    let gateway: Arc<dyn ReservationGateway> = Arc::new(gateway.clone());
    let planner = Planner::new(gateway.clone(), Arc::new(clock.clone()));
    (Scheduler::new(planner), CheckInExecutor::new(gateway))
}

fn days(n: i64) -> DateTime<Utc> {
    epoch() + Duration::days(n)
}

fn start() -> StartRun {
    StartRun::new(identity())
}

fn start_notifying(recipient: &str) -> StartRun {
    start().with_notify_recipient(autocheckin::Address::parse(recipient).unwrap())
}

/// Drive (advance, execute) pairs until the executor says done.
/// Returns the opportunities attempted, in order.
async fn drive(
    scheduler: &Scheduler,
    executor: &CheckInExecutor,
    start: StartRun,
) -> Result<Vec<DateTime<Utc>>, String> {
    let mut input = RunInput::Fresh(start);
    let mut attempted = Vec::new();

    loop {
        let state = scheduler.advance(input).await.map_err(|e| e.to_string())?;
        attempted.push(state.current.as_ref().unwrap().opens_at);

        let outcome = executor.execute(state).await.map_err(|e| e.to_string())?;
        match outcome.continuation {
            Continuation::Done => return Ok(attempted),
            Continuation::ContinueLater(state) => input = RunInput::Continuing(state),
        }
    }
}

// ============================================================================
// Planner
// ============================================================================

#[tokio::test]
async fn planner_orders_future_check_ins_soonest_last() {
    let gateway =
        FakeGateway::with_reservation(reservation_departing(&[days(6), days(-1), days(3)]));
    let clock = ManualClock::default();
    let planner = Planner::new(Arc::new(gateway.clone()), Arc::new(clock));

    let queue = planner.plan(&identity()).await.unwrap();
    let opens: Vec<_> = queue.iter().map(|o| o.opens_at).collect();

    // Departed bound dropped; stored furthest-out first; opens 24h ahead.
    assert_eq!(opens, vec![days(5), days(2)]);
    assert_eq!(queue.peek_next().unwrap().departs_at, days(3));
    assert_eq!(gateway.calls(), vec![GatewayCall::Lookup("ABC123".to_string())]);
}

#[tokio::test]
async fn planner_honours_custom_lead() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(4)]));
    let planner = Planner::new(Arc::new(gateway), Arc::new(ManualClock::default()))
        .with_check_in_lead(Duration::hours(48));

    let queue = planner.plan(&identity()).await.unwrap();
    assert_eq!(queue.peek_next().unwrap().opens_at, days(2));
}

#[tokio::test]
async fn planner_reports_unrepresentable_opening_time() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(4)]));
    let planner = Planner::new(Arc::new(gateway), Arc::new(ManualClock::default()))
        .with_check_in_lead(Duration::MAX);

    let err = planner.plan(&identity()).await.unwrap_err();
    assert_eq!(
        err,
        LookupError::OutOfRange {
            confirmation_number: "ABC123".to_string(),
            departs_at: days(4),
        }
    );
}

#[tokio::test]
async fn planner_rejects_someone_elses_reservation() {
    let mut reservation = reservation_departing(&[days(3)]);
    reservation.passengers = vec![Passenger {
        first_name: "Grace".to_string(),
        last_name: "Hopper".to_string(),
    }];
    let planner = Planner::new(
        Arc::new(FakeGateway::with_reservation(reservation)),
        Arc::new(ManualClock::default()),
    );

    let err = planner.plan(&identity()).await.unwrap_err();
    assert!(matches!(err, LookupError::Mismatch { .. }), "{err:?}");
}

#[tokio::test]
async fn planner_rejects_mismatched_confirmation_number() {
    let mut reservation = reservation_departing(&[days(3)]);
    reservation.confirmation_number = "ZZZ999".to_string();
    let planner = Planner::new(
        Arc::new(FakeGateway::with_reservation(reservation)),
        Arc::new(ManualClock::default()),
    );

    assert!(matches!(
        planner.plan(&identity()).await,
        Err(LookupError::Mismatch { .. })
    ));
}

#[tokio::test]
async fn planner_maps_gateway_failures() {
    let clock = Arc::new(ManualClock::default());

    let missing = Planner::new(Arc::new(FakeGateway::default()), clock.clone());
    assert_eq!(
        missing.plan(&identity()).await,
        Err(LookupError::NotFound {
            confirmation_number: "ABC123".to_string()
        })
    );

    let down = Planner::new(
        Arc::new(
            FakeGateway::with_reservation(reservation_departing(&[days(3)]))
                .failing_lookup(GatewayError::Transport("timeout".to_string())),
        ),
        clock,
    );
    assert!(matches!(
        down.plan(&identity()).await,
        Err(LookupError::Gateway { .. })
    ));
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn fresh_advance_matches_advance_on_planned_state() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(2), days(5)]));
    let clock = ManualClock::default();
    let (scheduler, _) = components(&gateway, &clock);

    let from_fresh = scheduler.advance(RunInput::Fresh(start())).await.unwrap();

    let planner = Planner::new(Arc::new(gateway.clone()), Arc::new(clock.clone()));
    let planned = WorkflowState::planned(start(), planner.plan(&identity()).await.unwrap());
    let from_planned = scheduler
        .advance(RunInput::Continuing(planned))
        .await
        .unwrap();

    assert_eq!(from_fresh, from_planned);
    assert_eq!(from_fresh.current.as_ref().unwrap().opens_at, days(1));
    assert_eq!(from_fresh.pending.len(), 1);
    assert_eq!(from_fresh.phase(), Phase::PlannedPending);
}

#[tokio::test]
async fn lookup_errors_propagate_unchanged() {
    let gateway = FakeGateway::default();
    let (scheduler, _) = components(&gateway, &ManualClock::default());

    let err = scheduler.advance(RunInput::Fresh(start())).await.unwrap_err();
    assert_eq!(
        err,
        SchedulerError::Lookup(LookupError::NotFound {
            confirmation_number: "ABC123".to_string()
        })
    );
}

#[tokio::test]
async fn reservation_with_nothing_ahead_is_exhausted_immediately() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(-3)]));
    let (scheduler, _) = components(&gateway, &ManualClock::default());

    assert!(matches!(
        scheduler.advance(RunInput::Fresh(start())).await,
        Err(SchedulerError::Exhausted { .. })
    ));
}

#[tokio::test]
async fn continuing_run_is_never_replanned() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(2), days(5)]));
    let (scheduler, executor) = components(&gateway, &ManualClock::default());

    let state = scheduler.advance(RunInput::Fresh(start())).await.unwrap();
    let Continuation::ContinueLater(state) = executor.execute(state).await.unwrap().continuation
    else {
        panic!("expected continuation");
    };
    scheduler
        .advance(RunInput::Continuing(state))
        .await
        .unwrap();

    let lookups = gateway
        .calls()
        .iter()
        .filter(|call| matches!(call, GatewayCall::Lookup(_)))
        .count();
    assert_eq!(lookups, 1);
}

// ============================================================================
// Executor and whole-run properties
// ============================================================================

#[tokio::test]
async fn two_opportunities_continue_then_complete() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(6), days(3)]));
    let (scheduler, executor) = components(&gateway, &ManualClock::default());

    // Invocation 1: plan, pop the soonest.
    let state = scheduler.advance(RunInput::Fresh(start())).await.unwrap();
    assert_eq!(state.current.as_ref().unwrap().opens_at, days(2));
    let outcome = executor.execute(state).await.unwrap();
    let Continuation::ContinueLater(state) = outcome.continuation else {
        panic!("first check-in should continue");
    };
    assert_eq!(state.current, None);
    assert_eq!(state.pending.len(), 1);
    assert_eq!(state.pending.peek_next().unwrap().opens_at, days(5));

    // Invocation 2: pop the last one, run completes.
    let state = scheduler
        .advance(RunInput::Continuing(state))
        .await
        .unwrap();
    assert_eq!(state.current.as_ref().unwrap().opens_at, days(5));
    let outcome = executor.execute(state).await.unwrap();
    assert_eq!(outcome.continuation, Continuation::Done);
    assert_eq!(gateway.check_ins(), 2);
}

#[tokio::test]
async fn n_opportunities_take_exactly_n_invocations() {
    for _ in 0..8 {
        let n = fastrand::usize(1..=6);
        let mut departures: Vec<_> = (0..n).map(|i| days(2 + 3 * i as i64)).collect();
        fastrand::shuffle(&mut departures);

        let gateway = FakeGateway::with_reservation(reservation_departing(&departures));
        let (scheduler, executor) = components(&gateway, &ManualClock::default());

        let attempted = drive(&scheduler, &executor, start()).await.unwrap();

        assert_eq!(attempted.len(), n);
        assert_eq!(gateway.check_ins(), n);
        // Strictly increasing, so never the same opportunity twice.
        assert!(attempted.windows(2).all(|w| w[0] < w[1]), "{attempted:?}");
    }
}

#[tokio::test]
async fn state_round_trip_mid_run_changes_nothing() {
    let gateway =
        FakeGateway::with_reservation(reservation_departing(&[days(2), days(4), days(8)]));
    let (scheduler, executor) = components(&gateway, &ManualClock::default());

    let state = scheduler.advance(RunInput::Fresh(start())).await.unwrap();
    let Continuation::ContinueLater(state) = executor.execute(state).await.unwrap().continuation
    else {
        panic!("expected continuation");
    };

    let value = state.to_value().unwrap();
    let through_json = RunInput::from_value(value).unwrap();
    assert_eq!(through_json, RunInput::Continuing(state.clone()));

    let direct = scheduler
        .advance(RunInput::Continuing(state))
        .await
        .unwrap();
    let resumed = scheduler.advance(through_json).await.unwrap();
    assert_eq!(direct, resumed);
}

#[tokio::test]
async fn check_in_failure_aborts_the_run() {
    let k = 2;
    let gateway =
        FakeGateway::with_reservation(reservation_departing(&[days(2), days(4), days(8)]))
            .failing_check_in_on(k);
    let (scheduler, executor) = components(&gateway, &ManualClock::default());

    let mut input = RunInput::Fresh(start());
    let mut continuations = 0;
    let err = loop {
        let state = scheduler.advance(input).await.unwrap();
        match executor.execute(state).await {
            Ok(outcome) => match outcome.continuation {
                Continuation::ContinueLater(state) => {
                    continuations += 1;
                    input = RunInput::Continuing(state);
                }
                Continuation::Done => panic!("run should not complete"),
            },
            Err(err) => break err,
        }
    };

    assert!(matches!(err, CheckInError::Rejected { .. }), "{err:?}");
    assert_eq!(continuations, k - 1);
    assert_eq!(gateway.check_ins(), k);
}

#[tokio::test]
async fn notification_failure_does_not_stop_the_run() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(2), days(4)]))
        .failing_notifications();
    let (scheduler, executor) = components(&gateway, &ManualClock::default());

    let state = scheduler
        .advance(RunInput::Fresh(start_notifying("friend@example.com")))
        .await
        .unwrap();
    let pending_before = state.pending.clone();

    let outcome = executor.execute(state).await.unwrap();
    let Continuation::ContinueLater(state) = outcome.continuation else {
        panic!("notification failure must not end the run");
    };
    assert_eq!(state.pending, pending_before);
    assert_eq!(gateway.notifications(), 1);

    let attempted = drive(&scheduler, &executor, start_notifying("friend@example.com"))
        .await
        .unwrap();
    assert_eq!(attempted.len(), 2);
}

#[tokio::test]
async fn boarding_pass_goes_to_recipient_after_check_in() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(2)]));
    let (scheduler, executor) = components(&gateway, &ManualClock::default());

    drive(&scheduler, &executor, start_notifying("friend@example.com"))
        .await
        .unwrap();

    assert_eq!(
        gateway.calls(),
        vec![
            GatewayCall::Lookup("ABC123".to_string()),
            GatewayCall::CheckIn("ABC123".to_string()),
            GatewayCall::SendBoardingPass {
                confirmation: "ABC123".to_string(),
                recipient: "friend@example.com".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn no_recipient_means_no_notification() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(2)]));
    let (scheduler, executor) = components(&gateway, &ManualClock::default());

    drive(&scheduler, &executor, start()).await.unwrap();
    assert_eq!(gateway.notifications(), 0);
}

#[tokio::test]
async fn executor_refuses_state_without_current() {
    let gateway = FakeGateway::with_reservation(reservation_departing(&[days(2)]));
    let (_, executor) = components(&gateway, &ManualClock::default());

    let state = WorkflowState::planned(start(), Default::default());
    assert!(matches!(
        executor.execute(state).await,
        Err(CheckInError::NotScheduled { .. })
    ));
    assert_eq!(gateway.check_ins(), 0);
}
