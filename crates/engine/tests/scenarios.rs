use approx::assert_relative_eq;

use daw_core::command::{
    add_bus, add_curve, add_marker, add_track, insert_clip, set_clip_fade, set_loop_range, set_punch_range,
    set_tempo, split_clip, update_curve_flags,
};
use daw_core::{
    Clip, ClipId, Command, Error, FadeCurve, FadeEdge, ParamId, Session, SourceId, TrackFlag, TrackId, TrackKind,
    ValueRange,
};
use daw_engine::{ControlEvent, EngineConfig, EngineHandle, SessionEngine, TransportController, TransportState, start};

fn engine() -> (SessionEngine, TransportController, EngineHandle) {
    let session = Session::new("Scenario", 44100, 120.0, 4, 4).unwrap();
    start(session, &EngineConfig::default()).unwrap()
}

fn add_audio_track(engine: &mut SessionEngine, name: &str) -> TrackId {
    engine
        .execute(add_track(engine.session(), TrackKind::Audio, name))
        .unwrap();
    engine.session().graph().tracks().last().unwrap().id
}

fn arm(engine: &mut SessionEngine, track: TrackId) {
    engine
        .execute(Command::SetTrackFlag {
            track,
            flag: TrackFlag::Armed,
            value: true,
        })
        .unwrap();
}

fn ride(io: &mut EngineHandle, track: TrackId, value: f64) {
    io.controls
        .push(ControlEvent {
            track,
            param: ParamId::GAIN,
            value,
            offset: 0,
        })
        .unwrap();
}

#[test]
fn test_fade_in_midpoint_and_undo() {
    let (mut engine, _controller, _io) = engine();
    let track = add_audio_track(&mut engine, "Audio");

    let clip = Clip::new(ClipId(0), TrackKind::Audio, SourceId(1), 44100);
    engine
        .execute(insert_clip(engine.session(), track, clip).unwrap())
        .unwrap();
    let id = engine.session().graph().track(track).unwrap().clips()[0].id;

    engine
        .execute(set_clip_fade(engine.session(), track, id, FadeEdge::In, 4410, FadeCurve::Linear).unwrap())
        .unwrap();
    let clip = engine.session().graph().track(track).unwrap().clip(id).unwrap();
    assert_relative_eq!(clip.fade_gain_at(2205), 0.5);
    assert_relative_eq!(clip.fade_gain_at(4410), 1.0);

    engine.undo().unwrap();
    let clip = engine.session().graph().track(track).unwrap().clip(id).unwrap();
    assert!(!clip.fade_in.is_active());
    assert_relative_eq!(clip.fade_gain_at(2205), 1.0);
}

#[test]
fn test_solo_reaches_snapshot() {
    let (mut engine, mut controller, _io) = engine();
    let a = add_audio_track(&mut engine, "A");
    let b = add_audio_track(&mut engine, "B");
    let c = add_audio_track(&mut engine, "C");

    let solo = |value| Command::SetTrackFlag {
        track: a,
        flag: TrackFlag::Soloed,
        value,
    };

    engine.execute(solo(true)).unwrap();
    controller.process(64);
    let snapshot = controller.snapshot();
    assert!(snapshot.is_audible(a));
    assert!(!snapshot.is_audible(b));
    assert!(!snapshot.is_audible(c));

    engine.execute(solo(false)).unwrap();
    controller.process(64);
    let snapshot = controller.snapshot();
    assert!([a, b, c].iter().all(|t| snapshot.is_audible(*t)));
}

#[test]
fn test_removing_routed_bus_is_rejected() {
    let (mut engine, _controller, _io) = engine();
    let track = add_audio_track(&mut engine, "Vocal");
    engine
        .execute(add_bus(engine.session(), TrackKind::Audio, "Reverb"))
        .unwrap();
    let bus = engine.session().graph().buses()[0].id;
    engine
        .execute(Command::SetTrackRouting {
            track,
            input: None,
            output: Some(bus),
        })
        .unwrap();

    let before = engine.session().clone();
    let depth = engine.history().undo_len();
    let err = engine.execute(Command::RemoveBus { bus }).unwrap_err();

    assert!(matches!(err, Error::BusInUse { .. }));
    assert_eq!(engine.session(), &before);
    assert_eq!(engine.history().undo_len(), depth);
}

#[test]
fn test_undo_everything_restores_session() {
    let (mut engine, _controller, _io) = engine();
    let initial = engine.session().clone();

    let track = add_audio_track(&mut engine, "Bass");
    let clip = Clip::new(ClipId(0), TrackKind::Audio, SourceId(7), 88200).at(1000);
    engine
        .execute(insert_clip(engine.session(), track, clip).unwrap())
        .unwrap();
    let id = engine.session().graph().track(track).unwrap().clips()[0].id;

    let edits = vec![
        split_clip(engine.session(), track, id, 20000).unwrap(),
        set_tempo(engine.session(), 0, 96.0),
        add_marker(engine.session(), "Verse", 44100),
        set_loop_range(0, 88200).unwrap(),
        add_curve(track, ParamId::PAN, ValueRange::new(-1.0, 1.0, 0.0).unwrap()),
        Command::SetTrackFlag {
            track,
            flag: TrackFlag::Muted,
            value: true,
        },
        Command::RenameTrack {
            track,
            name: "Sub Bass".into(),
        },
    ];
    for edit in edits {
        engine.execute(edit).unwrap();
    }

    let executed = engine.history().undo_len();
    for _ in 0..executed {
        assert!(engine.undo().unwrap().is_some());
    }
    assert_eq!(engine.session(), &initial);
    assert_eq!(engine.undo().unwrap(), None);
}

#[test]
fn test_loop_plays_every_frame_once() {
    let (mut engine, mut controller, _io) = engine();
    engine.execute(set_loop_range(0, 1000).unwrap()).unwrap();
    engine.set_looping(true);
    engine.play();

    let starts: Vec<u64> = (0..10).map(|_| controller.process(300)).collect();
    assert_eq!(starts, [0, 300, 600, 900, 200, 500, 800, 100, 400, 700]);
}

#[test]
fn test_locate_while_rolling_resumes_rolling() {
    let (mut engine, mut controller, _io) = engine();
    engine.play();
    controller.process(256);
    controller.process(256);

    engine.locate(44100);
    controller.process(256);
    assert_eq!(controller.state(), TransportState::Seeking);
    assert_eq!(controller.process(256), 44100);
    assert_eq!(controller.state(), TransportState::Rolling);

    let report = engine.poll();
    assert_eq!(report.position, 44356);
    assert_eq!(engine.position().bbt().bar, 1);
    assert_eq!(engine.position().bbt().beat, 3);
}

#[test]
fn test_xrun_is_counted_and_playback_continues() {
    let session = Session::new("Xrun", 44100, 120.0, 4, 4).unwrap();
    let config = EngineConfig {
        max_block_size: 256,
        ..EngineConfig::default()
    };
    let (mut engine, mut controller, _io) = start(session, &config).unwrap();
    engine.play();
    controller.process(256);
    controller.xrun();
    controller.process(1024);
    controller.process(256);

    let report = engine.poll();
    assert_eq!(report.xruns, 2);
    assert_eq!(report.position, 512);
    assert!(matches!(report.glitch, Some(Error::RealtimeGlitch { xruns: 2 })));
    assert_eq!(report.state, TransportState::Rolling);
}

#[test]
fn test_recorded_automation_is_one_undo_step() {
    let (mut engine, mut controller, mut io) = engine();
    let track = add_audio_track(&mut engine, "Lead");
    engine
        .execute(add_curve(track, ParamId::GAIN, ValueRange::unit()))
        .unwrap();
    engine
        .execute(update_curve_flags(engine.session(), track, ParamId::GAIN, |f| f.record = true).unwrap())
        .unwrap();
    arm(&mut engine, track);
    engine.execute(set_punch_range(512, 4096).unwrap()).unwrap();

    engine.record(true);
    engine.play();
    for value in [0.1, 0.2, 0.3, 0.4] {
        io.controls
            .push(ControlEvent {
                track,
                param: ParamId::GAIN,
                value,
                offset: 0,
            })
            .unwrap();
        controller.process(256);
    }
    engine.stop();
    controller.process(256);
    engine.poll();

    let curve = engine.session().graph().track(track).unwrap().curve(ParamId::GAIN).unwrap();
    let frames: Vec<u64> = curve.nodes().iter().map(|n| n.frame).collect();
    assert_eq!(frames, [512, 768]);
    assert_eq!(engine.undo_label(), Some("Record Automation"));

    engine.undo().unwrap();
    let curve = engine.session().graph().track(track).unwrap().curve(ParamId::GAIN).unwrap();
    assert!(curve.is_empty());
    assert_eq!(engine.undo_label(), Some("Set Punch Range"));
}

#[test]
fn test_tempo_edit_moves_bar_position() {
    let (mut engine, mut controller, _io) = engine();
    engine.locate(88200);
    controller.process(64);
    controller.process(64);
    engine.poll();
    assert_eq!(engine.position().bbt().bar, 2);

    engine.execute(set_tempo(engine.session(), 0, 60.0)).unwrap();
    assert_eq!(engine.position().bbt().bar, 1);
    assert_eq!(engine.position().bbt().beat, 3);
}

#[test]
fn test_edit_while_recording_splits_the_pass() {
    let (mut engine, mut controller, mut io) = engine();
    let track = add_audio_track(&mut engine, "Lead");
    engine
        .execute(add_curve(track, ParamId::GAIN, ValueRange::unit()))
        .unwrap();
    engine
        .execute(update_curve_flags(engine.session(), track, ParamId::GAIN, |f| f.record = true).unwrap())
        .unwrap();
    arm(&mut engine, track);

    engine.record(true);
    engine.play();
    controller.process(256);
    ride(&mut io, track, 0.2);
    controller.process(256);
    engine.poll();

    engine.execute(add_marker(engine.session(), "Chorus", 0)).unwrap();
    ride(&mut io, track, 0.6);
    controller.process(256);
    engine.stop();
    controller.process(256);
    engine.poll();

    let curve = engine.session().graph().track(track).unwrap().curve(ParamId::GAIN).unwrap();
    assert_eq!(curve.len(), 2);
    assert_eq!(controller.state(), TransportState::Stopped);

    let mut labels = Vec::new();
    for _ in 0..3 {
        labels.push(engine.undo().unwrap().unwrap());
    }
    assert_eq!(labels, ["Record Automation", "Add Marker", "Record Automation"]);
    let curve = engine.session().graph().track(track).unwrap().curve(ParamId::GAIN).unwrap();
    assert!(curve.is_empty());
}
