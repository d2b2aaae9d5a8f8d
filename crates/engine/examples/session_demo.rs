//! Drives the engine from a simulated audio thread: builds a short
//! arrangement, plays it with a loop, records a gain ride and undoes it.
//!
//! Run with `RUST_LOG=debug cargo run -p daw_engine --example session_demo`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use daw_core::command::{add_curve, add_track, insert_clip, set_clip_fade, set_loop_range, update_curve_flags};
use daw_core::{
    Clip, ClipId, Command, FadeCurve, FadeEdge, ParamId, Session, SourceId, TrackFlag, TrackKind, ValueRange,
};
use daw_engine::{ControlEvent, EngineConfig, TransportState};

const BLOCK: usize = 512;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = EngineConfig::default();
    let session = Session::new("Demo", config.sample_rate, 120.0, 4, 4)?;
    let (mut engine, mut controller, mut io) = daw_engine::start(session, &config)?;

    engine.execute(add_track(engine.session(), TrackKind::Audio, "Drums"))?;
    let drums = engine.session().graph().tracks()[0].id;

    let clip = Clip::new(ClipId(0), TrackKind::Audio, SourceId(1), 88_200);
    engine.execute(insert_clip(engine.session(), drums, clip)?)?;
    let clip = engine.session().graph().track(drums)?.clips()[0].clone();
    engine.execute(set_clip_fade(engine.session(), drums, clip.id, FadeEdge::In, 4410, FadeCurve::SCurve)?)?;

    engine.execute(add_curve(drums, ParamId::GAIN, ValueRange::unit()))?;
    engine.execute(update_curve_flags(engine.session(), drums, ParamId::GAIN, |flags| {
        flags.record = true
    })?)?;
    engine.execute(Command::SetTrackFlag {
        track: drums,
        flag: TrackFlag::Armed,
        value: true,
    })?;
    engine.execute(set_loop_range(0, 44_100)?)?;

    let running = Arc::new(AtomicBool::new(true));
    let driver = {
        let running = Arc::clone(&running);
        thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                controller.process(BLOCK);
                thread::sleep(Duration::from_millis(2));
            }
        })
    };

    engine.set_looping(true);
    engine.record(true);
    engine.play();

    for step in 0..50u32 {
        let _ = io.controls.push(ControlEvent {
            track: drums,
            param: ParamId::GAIN,
            value: f64::from(step) / 50.0,
            offset: 0,
        });
        while io.params.pop().is_ok() {}

        let report = engine.poll();
        if report.glitch.is_some() {
            log::warn!("driver glitched at frame {}", report.position);
        }
        thread::sleep(Duration::from_millis(5));
    }

    engine.stop();
    while engine.poll().state != TransportState::Stopped {
        thread::sleep(Duration::from_millis(1));
    }

    running.store(false, Ordering::Release);
    if driver.join().is_err() {
        anyhow::bail!("driver thread panicked");
    }

    let points = engine.session().graph().track(drums)?.curve(ParamId::GAIN)?.len();
    println!("recorded {points} gain points, stopped at {:?}", engine.position().bbt());
    println!("undo: {:?}", engine.undo()?);
    println!("redo available: {:?}", engine.redo_label());

    Ok(())
}
