//! End-to-end player tests: control handle, audio-thread processor, faults and
//! offline preprocessing.

#[path = "helpers/mod.rs"]
mod helpers;

use std::thread;
use std::time::{Duration, Instant};

use helpers::*;
use vibe::player::Error as PlayerError;
use vibe::prelude::*;
use vibe::stretch::HeapMemory;

// =============================================================================
// Handle <-> processor
// =============================================================================

/// Wait until `predicate` matches an event, collecting everything seen.
fn wait_for(
    handle: &PlayerHandle,
    seen: &mut Vec<EngineEvent>,
    predicate: impl Fn(&EngineEvent) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Ok(Some(event)) = handle.recv_event_timeout(Duration::from_millis(50)) {
            let hit = predicate(&event);
            seen.push(event);
            if hit {
                return true;
            }
        }
    }
    false
}

#[test]
fn test_threaded_playback_lifecycle() {
    init_tracing();
    let (handle, mut processor) =
        create_player(SoftStretcher::new(), EngineConfig::default()).unwrap();

    let audio = thread::spawn(move || {
        let mut out = quantum_buffers(2);
        let mut quanta = 0usize;
        while processor.process(&mut out) {
            quanta += 1;
            thread::sleep(Duration::from_micros(200));
        }
        quanta
    });

    let mut events = Vec::new();
    handle.load_audio(sine_source(2.0, 2)).unwrap();
    assert!(wait_for(&handle, &mut events, |e| matches!(
        e,
        EngineEvent::Status {
            status: Status::Ready
        }
    )));

    handle.set_speed(1.5).unwrap();
    handle.play().unwrap();
    assert!(wait_for(&handle, &mut events, |e| matches!(
        e,
        EngineEvent::TimeUpdate { current_time } if *current_time > 0.1
    )));

    handle.pause().unwrap();
    handle.cleanup().unwrap();
    assert!(wait_for(&handle, &mut events, |e| matches!(
        e,
        EngineEvent::Status {
            status: Status::CleanedUp
        }
    )));

    let quanta = audio.join().unwrap();
    assert!(quanta > 0);
    assert!(events.contains(&EngineEvent::PlaybackState { is_playing: true }));
    assert!(handle.dsp_load().quanta > 0);
}

#[test]
fn test_wire_messages_drive_the_processor() {
    let (handle, mut processor) =
        create_player(SoftStretcher::new(), EngineConfig::default()).unwrap();

    let json = serde_json::json!({
        "type": "load-audio",
        "channels": [generate_sine(220.0, TEST_SAMPLE_RATE, 22050)],
        "channelCount": 1,
        "sampleRate": TEST_SAMPLE_RATE,
    });
    handle
        .send_wire(serde_json::from_value(json).unwrap())
        .unwrap();
    handle
        .send_wire(serde_json::from_str(r#"{"type":"play"}"#).unwrap())
        .unwrap();
    assert!(handle
        .send_wire(serde_json::from_str(r#"{"type":"set-speed","value":-2}"#).unwrap())
        .is_err());

    let mut out = quantum_buffers(1);
    for _ in 0..50 {
        processor.process(&mut out);
    }
    assert!(processor.controller().state().is_playing());

    let events = handle.drain_events();
    assert!(matches!(events.first(), Some(EngineEvent::Error { .. })));
    assert_eq!(count_status(&events, Status::Ready), 1);
    assert!(!time_updates(&events).is_empty());
}

// =============================================================================
// Faults
// =============================================================================

fn faulty_playing() -> TestController<FaultyModule> {
    let mut c = controller(FaultyModule::default());
    c.handle(ControlMessage::LoadAudio(sine_source(2.0, 2)));
    c.handle(ControlMessage::Play);
    run_quanta(&mut c, 30);
    c
}

#[test]
fn test_panic_mutes_quantum_and_pauses() {
    let mut c = faulty_playing();
    c.module_mut().fault = Fault::Panic;

    let mut out = vec![vec![1.0f32; TEST_QUANTUM]; 2];
    c.render(&mut out);
    assert!(is_silent(&out));
    assert_eq!(c.state(), PlayerState::Ready(Transport::Paused));
    assert!(c
        .events()
        .iter()
        .any(|e| matches!(e, EngineEvent::Error { message } if message.contains("panicked"))));

    // The session survives and resumes once the module behaves.
    c.module_mut().fault = Fault::None;
    c.handle(ControlMessage::Play);
    assert!(run_quanta(&mut c, 20) > 0);
}

#[test]
fn test_native_fault_is_recoverable() {
    let mut c = faulty_playing();
    c.module_mut().fault = Fault::Trap;

    let mut out = quantum_buffers(2);
    c.render(&mut out);
    assert!(is_silent(&out));
    assert_eq!(c.state(), PlayerState::Ready(Transport::Paused));
    assert!(c.session().is_some());
    assert_eq!(
        c.events().last(),
        Some(&EngineEvent::PlaybackState { is_playing: false })
    );
}

#[test]
fn test_arena_overrun_ends_session() {
    let mut c = faulty_playing();
    c.module_mut().fault = Fault::Overrun;

    let mut out = quantum_buffers(2);
    c.render(&mut out);
    assert!(is_silent(&out));
    assert_eq!(c.state(), PlayerState::Failed);
    assert!(c.session().is_none());
    assert_eq!(c.module().inner.live_instances(), 0);
    assert_eq!(c.module().memory().live_allocations(), 0);

    c.module_mut().fault = Fault::None;
    c.handle(ControlMessage::LoadAudio(sine_source(1.0, 1)));
    assert_eq!(c.state(), PlayerState::Ready(Transport::Paused));
}

#[test]
fn test_engine_create_failure_is_reported() {
    let mut c = controller(FaultyModule {
        inner: SoftStretcher::new(),
        fault: Fault::RefuseCreate,
    });
    c.handle(ControlMessage::LoadAudio(sine_source(1.0, 2)));
    assert_eq!(c.state(), PlayerState::Failed);
    assert!(matches!(c.events().last(), Some(EngineEvent::Error { .. })));
    assert_eq!(c.module().memory().live_allocations(), 0);

    // Play stays disabled until a new load succeeds.
    c.handle(ControlMessage::Play);
    assert_eq!(run_quanta(&mut c, 5), 0);

    c.module_mut().fault = Fault::None;
    c.handle(ControlMessage::LoadAudio(sine_source(1.0, 2)));
    assert_eq!(c.state(), PlayerState::Ready(Transport::Paused));
}

#[test]
fn test_allocation_failure_is_reported() {
    let mut c = controller(SoftStretcher::with_memory(HeapMemory::with_limits(64, 2048)));
    c.handle(ControlMessage::LoadAudio(sine_source(1.0, 2)));
    assert_eq!(c.state(), PlayerState::Failed);
    assert!(matches!(c.events().last(), Some(EngineEvent::Error { .. })));
    assert_eq!(c.module().live_instances(), 0);
}

// =============================================================================
// Offline preprocessing
// =============================================================================

#[test]
fn test_offline_half_speed_length() {
    init_tracing();
    let (handle, _processor) =
        create_player(SoftStretcher::new(), EngineConfig::default()).unwrap();
    let source = sine_source(10.0, 1);
    assert_eq!(source.frames(), 441_000);

    let slowed = handle
        .preprocess(&mut SoftStretcher::new(), &source, 0.5)
        .unwrap();
    let block = handle.config().block_size_frames;
    assert!(
        slowed.frames().abs_diff(882_000) <= 2 * block,
        "got {} frames",
        slowed.frames()
    );
    assert!(!handle.is_preprocessing());
}

#[test]
fn test_preprocessed_track_plays_at_unity() {
    let mut offline = SoftStretcher::new();
    let slowed = OfflinePreprocessor::new(EngineConfig::default())
        .render(&mut offline, &sine_source(0.5, 2), 0.5)
        .unwrap();
    assert_eq!(slowed.channel_count(), 2);

    let mut c = controller(SoftStretcher::new());
    c.handle(ControlMessage::LoadAudio(slowed));
    c.handle(ControlMessage::Play);
    assert!(run_quanta(&mut c, 100) > 0);
    assert_eq!(c.session().unwrap().engine().applied_ratio(), 1.0);
}

#[test]
fn test_preprocess_without_output_reports_empty_output() {
    let (handle, _processor) =
        create_player(SoftStretcher::new(), EngineConfig::default()).unwrap();
    let mut offline = FaultyModule::new(Fault::Mute);

    let result = handle.preprocess(&mut offline, &sine_source(1.0, 2), 0.5);
    assert!(matches!(
        result,
        Err(PlayerError::EmptyOutput {
            input_frames: 44_100
        })
    ));
    assert_eq!(offline.inner.live_instances(), 0);
    assert_eq!(offline.memory().live_allocations(), 0);
    assert!(!handle.is_preprocessing());
    assert!(matches!(
        handle.drain_events().as_slice(),
        [EngineEvent::Error { .. }]
    ));
}

#[test]
fn test_offline_render_terminates_when_engine_stalls() {
    let mut offline = FaultyModule::new(Fault::Stall);
    let result = OfflinePreprocessor::new(EngineConfig::default()).render(
        &mut offline,
        &sine_source(0.5, 1),
        1.0,
    );

    assert!(matches!(result, Err(PlayerError::EmptyOutput { .. })));
    assert_eq!(offline.inner.live_instances(), 0);
    assert_eq!(offline.memory().live_allocations(), 0);
}

#[test]
fn test_offline_fault_mid_render_releases_resources() {
    for fault in [Fault::Trap, Fault::Overrun] {
        let mut offline = FaultyModule::new(fault);
        let result = OfflinePreprocessor::new(EngineConfig::default()).render(
            &mut offline,
            &sine_source(1.0, 2),
            0.75,
        );

        assert!(result.is_err(), "{fault:?} should fail the render");
        assert_eq!(offline.inner.live_instances(), 0, "{fault:?}");
        assert_eq!(offline.memory().live_allocations(), 0, "{fault:?}");

        // The module is reusable once it behaves.
        offline.fault = Fault::None;
        let rendered = OfflinePreprocessor::new(EngineConfig::default())
            .render(&mut offline, &sine_source(0.25, 2), 0.75)
            .unwrap();
        assert!(rendered.frames() > 0);
        assert_eq!(offline.inner.live_instances(), 0);
    }
}

#[test]
fn test_session_messages_wait_for_preprocessing() {
    let (handle, mut processor) =
        create_player(SoftStretcher::new(), EngineConfig::default()).unwrap();
    handle.load_audio(sine_source(0.5, 1)).unwrap();

    thread::scope(|scope| {
        let worker = scope.spawn(|| {
            let mut offline = SoftStretcher::new();
            handle.preprocess(&mut offline, &sine_source(20.0, 2), 0.25)
        });

        // Spin until the render has started, then try to replace the session.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_preprocessing() && !worker.is_finished() && Instant::now() < deadline {
            thread::yield_now();
        }
        if handle.is_preprocessing() {
            assert!(matches!(
                handle.load_audio(sine_source(0.1, 2)),
                Err(PlayerError::PreprocessorBusy)
            ));
            assert!(matches!(handle.cleanup(), Err(PlayerError::PreprocessorBusy)));
        }
        assert!(worker.join().unwrap().is_ok());
    });

    assert!(!handle.is_preprocessing());
    handle.cleanup().unwrap();
    let mut out = quantum_buffers(1);
    assert!(!processor.process(&mut out));
}
