//! Session engine: owns the authoritative [`Session`] and its history on the
//! editing thread and feeds immutable snapshots to a [`TransportController`]
//! running on the driver thread.

pub mod config;
pub mod controller;
pub mod snapshot;

pub use config::EngineConfig;
pub use controller::{
    ControlEvent, ParamChange, SharedTransport, Status, TransportCommand, TransportController,
    TransportState,
};
pub use snapshot::{SessionSnapshot, TrackCurve, TrackMix};

use std::sync::Arc;

use basedrop::{Collector, Shared};
use rtrb::{Consumer, Producer, RingBuffer};

use daw_core::{CapturedEvent, Command, Error, History, Position, RecordPass, Result, Session};

use controller::ControllerQueues;

const SNAPSHOT_QUEUE_CAPACITY: usize = 4;

/// Endpoints for the driver side that are not part of the controller:
/// live control input and the parameter stream for the plugin host.
pub struct EngineHandle {
    pub controls: Producer<ControlEvent>,
    pub params: Consumer<ParamChange>,
    pub transport: Arc<SharedTransport>,
}

/// What a call to [`SessionEngine::poll`] observed.
#[derive(Debug, Default)]
pub struct PollReport {
    pub position: u64,
    pub state: TransportState,
    /// Xruns reported since the previous poll.
    pub xruns: u64,
    /// Automation points written into the session.
    pub captured: usize,
    /// Parameter changes the real-time side could not hand to the plugin
    /// host since the previous poll.
    pub dropped_params: u64,
    pub glitch: Option<Error>,
}

pub struct SessionEngine {
    session: Session,
    history: History,
    revision: u64,
    collector: Collector,
    commands: Producer<TransportCommand>,
    snapshots: Producer<Shared<SessionSnapshot>>,
    /// Snapshot that did not fit in the queue yet.
    pending: Option<Shared<SessionSnapshot>>,
    status: Consumer<Status>,
    captures: Consumer<CapturedEvent>,
    record_pass: Option<RecordPass>,
    shared: Arc<SharedTransport>,
    state: TransportState,
    xruns: u64,
}

/// Starts an engine for `session` with an empty history.
pub fn start(
    session: Session,
    config: &EngineConfig,
) -> Result<(SessionEngine, TransportController, EngineHandle)> {
    start_with_history(session, History::new(config.history_depth), config)
}

/// Starts an engine, typically for a loaded project that carries its own
/// history.
pub fn start_with_history(
    session: Session,
    history: History,
    config: &EngineConfig,
) -> Result<(SessionEngine, TransportController, EngineHandle)> {
    session.validate()?;
    if session.sample_rate() != config.sample_rate {
        return Err(Error::InvalidArgument(format!(
            "session runs at {} Hz but the engine is configured for {} Hz",
            session.sample_rate(),
            config.sample_rate
        )));
    }
    if config.max_block_size == 0 {
        return Err(Error::InvalidArgument("max_block_size must be positive".into()));
    }

    let collector = Collector::new();
    let handle = collector.handle();

    let (command_tx, command_rx) = RingBuffer::<TransportCommand>::new(config.command_queue_capacity);
    let (status_tx, status_rx) = RingBuffer::<Status>::new(config.status_queue_capacity);
    let (snapshot_tx, snapshot_rx) = RingBuffer::<Shared<SessionSnapshot>>::new(SNAPSHOT_QUEUE_CAPACITY);
    let (control_tx, control_rx) = RingBuffer::<ControlEvent>::new(config.param_queue_capacity);
    let (param_tx, param_rx) = RingBuffer::<ParamChange>::new(config.param_queue_capacity);
    let (capture_tx, capture_rx) = RingBuffer::<CapturedEvent>::new(config.capture_queue_capacity);

    let initial = Shared::new(&handle, SessionSnapshot::from_session(&session, 0));
    let shared = Arc::new(SharedTransport::default());

    let controller = TransportController::new(
        initial,
        ControllerQueues {
            commands: command_rx,
            snapshots: snapshot_rx,
            controls: control_rx,
            status: status_tx,
            params: param_tx,
            captures: capture_tx,
        },
        Arc::clone(&shared),
        config.max_block_size,
    );

    log::info!(
        "engine started for '{}' at {} Hz, {} tracks",
        session.name,
        session.sample_rate(),
        session.graph().tracks().len()
    );

    let engine = SessionEngine {
        session,
        history,
        revision: 0,
        collector,
        commands: command_tx,
        snapshots: snapshot_tx,
        pending: None,
        status: status_rx,
        captures: capture_rx,
        record_pass: None,
        shared: Arc::clone(&shared),
        state: TransportState::Stopped,
        xruns: 0,
    };

    let handle = EngineHandle {
        controls: control_tx,
        params: param_rx,
        transport: shared,
    };

    Ok((engine, controller, handle))
}

impl SessionEngine {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Number of snapshots published so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Hands the session and history back, e.g. for saving.
    pub fn into_parts(mut self) -> (Session, History) {
        self.finish_record_pass();
        (self.session, self.history)
    }

    /// Applies `command` and publishes the result. A rejected command is
    /// logged with its reason code and leaves everything unchanged.
    ///
    /// Automation recorded so far is committed first, so an edit made while
    /// recording ends up between two "Record Automation" entries. The same
    /// holds for [`undo`](Self::undo) and [`redo`](Self::redo).
    pub fn execute(&mut self, command: Command) -> Result<()> {
        self.finish_record_pass();
        let label = command.label();
        match self.history.execute(&mut self.session, command) {
            Ok(()) => {
                self.publish();
                Ok(())
            }
            Err(err) => {
                log::warn!("rejected '{label}' ({}): {err}", err.reason_code());
                Err(err)
            }
        }
    }

    pub fn undo(&mut self) -> Result<Option<String>> {
        self.finish_record_pass();
        let label = self.history.undo(&mut self.session)?;
        if let Some(label) = &label {
            log::debug!("undo '{label}'");
            self.publish();
        }
        Ok(label)
    }

    pub fn redo(&mut self) -> Result<Option<String>> {
        self.finish_record_pass();
        let label = self.history.redo(&mut self.session)?;
        if let Some(label) = &label {
            log::debug!("redo '{label}'");
            self.publish();
        }
        Ok(label)
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.history.undo_label()
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.history.redo_label()
    }

    pub fn play(&mut self) {
        self.send(TransportCommand::Play);
    }

    pub fn stop(&mut self) {
        self.send(TransportCommand::Stop);
    }

    /// Arms or disarms recording. Recording starts once the transport rolls
    /// inside the punch range, or right away without one.
    pub fn record(&mut self, armed: bool) {
        self.send(TransportCommand::Record(armed));
    }

    pub fn locate(&mut self, frame: u64) {
        self.send(TransportCommand::Locate(frame));
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.send(TransportCommand::SetLooping(looping));
    }

    fn send(&mut self, command: TransportCommand) {
        if self.commands.push(command).is_err() {
            log::warn!("transport queue full, dropped {command:?}");
        }
    }

    pub fn current_position(&self) -> u64 {
        self.shared.current_position()
    }

    pub fn position(&self) -> Position {
        self.session.tempo().position(self.current_position())
    }

    pub fn transport_state(&self) -> TransportState {
        self.shared.transport_state()
    }

    pub fn xrun_count(&self) -> u64 {
        self.shared.xrun_count()
    }

    /// Publishes the current session to the real-time side.
    pub fn publish(&mut self) {
        self.revision += 1;
        let snapshot = SessionSnapshot::from_session(&self.session, self.revision);
        // A newer snapshot supersedes one still waiting for room.
        self.pending = Some(Shared::new(&self.collector.handle(), snapshot));
        self.flush_pending();
    }

    fn flush_pending(&mut self) {
        if let Some(snapshot) = self.pending.take()
            && let Err(rtrb::PushError::Full(snapshot)) = self.snapshots.push(snapshot)
        {
            self.pending = Some(snapshot);
        }
    }

    /// Drains everything the real-time side reported. Call regularly from
    /// the editing thread.
    pub fn poll(&mut self) -> PollReport {
        let mut report = PollReport::default();

        while let Ok(event) = self.captures.pop() {
            let pass = self.record_pass.get_or_insert_with(RecordPass::new);
            match pass.capture(&mut self.session, event) {
                Ok(()) => report.captured += 1,
                Err(err) => log::warn!("dropped captured automation ({}): {err}", err.reason_code()),
            }
        }

        while let Ok(status) = self.status.pop() {
            match status {
                Status::Position(_) => {}
                Status::State(state) => {
                    log::info!("transport {:?} -> {state:?}", self.state);
                    if self.state == TransportState::Recording {
                        self.finish_record_pass();
                    }
                    self.state = state;
                }
                Status::Xrun(total) => {
                    let new = total.saturating_sub(self.xruns);
                    self.xruns = total;
                    report.xruns += new;
                }
                Status::CaptureOverflow => {
                    log::warn!("capture queue overflowed, recorded automation was lost");
                }
                Status::ParamOverflow(dropped) => report.dropped_params += dropped,
            }
        }

        if report.dropped_params > 0 {
            log::warn!("param queue full, {} parameter change(s) dropped", report.dropped_params);
        }

        if report.xruns > 0 {
            log::warn!("{} xrun(s), {} total", report.xruns, self.xruns);
            report.glitch = Some(Error::RealtimeGlitch { xruns: self.xruns });
        }

        if report.captured > 0 {
            self.publish();
        } else {
            self.flush_pending();
        }
        self.collector.collect();

        report.position = self.shared.current_position();
        report.state = self.state;
        report
    }

    fn finish_record_pass(&mut self) {
        if let Some(pass) = self.record_pass.take() {
            pass.finish(&mut self.history);
        }
    }
}
