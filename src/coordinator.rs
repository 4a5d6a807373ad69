//! Control coordinator
//!
//! Single owner of the run state. Inbound messages are handled one at a time
//! in arrival order: lifecycle and mode commands are applied inline, slow
//! commands are spawned. Each run gets its own stop channel, so a `stop`
//! followed quickly by `start` cannot revive the previous loops.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::bus::{Command, InboundMessage, Telemetry};
use crate::config::{PidConfig, RigConfig, TimingConfig};
use crate::control::CalibrationTable;
use crate::hardware::{ActuatorBank, AttitudeSource, LoadCellArray};
use crate::session::{SessionClock, SessionId, SessionRecorder};
use crate::state::{try_lock, ControlMode, SharedTargets};
use crate::tasks::{self, RunContext, StopSignal};

/// Upper bound on waiting for loops and command tasks at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared handles to the rig, cloned into every loop and command task
#[derive(Clone)]
pub struct RigContext {
    pub attitude: Arc<Mutex<AttitudeSource>>,
    pub imu_poll_interval: Duration,
    pub load_cells: Arc<Mutex<LoadCellArray>>,
    pub actuators: Arc<Mutex<ActuatorBank>>,
    pub table: Arc<CalibrationTable>,
    pub telemetry: Telemetry,
    pub recorder: Arc<SessionRecorder>,
    pub targets: Arc<SharedTargets>,
    pub pid: PidConfig,
    pub timing: TimingConfig,
    pub log_dir: PathBuf,
}

impl RigContext {
    pub fn new(
        config: &RigConfig,
        table: CalibrationTable,
        attitude: AttitudeSource,
        load_cells: LoadCellArray,
        actuators: ActuatorBank,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            imu_poll_interval: attitude.poll_interval(),
            attitude: Arc::new(Mutex::new(attitude)),
            load_cells: Arc::new(Mutex::new(load_cells)),
            actuators: Arc::new(Mutex::new(actuators)),
            table: Arc::new(table),
            telemetry,
            recorder: Arc::new(SessionRecorder::new()),
            targets: Arc::new(SharedTargets::new()),
            pid: config.pid,
            timing: config.timing,
            log_dir: config.log_dir.clone(),
        }
    }
}

/// Handle of the active run
struct RunHandle {
    stop: watch::Sender<bool>,
    session: SessionId,
}

pub struct Coordinator {
    rig: RigContext,
    run: Option<RunHandle>,
    /// Loops of the current and of stopped runs still finishing
    loops: JoinSet<()>,
    /// In-flight weigh, tare and save tasks
    commands: JoinSet<()>,
}

impl Coordinator {
    pub fn new(rig: RigContext) -> Self {
        Self {
            rig,
            run: None,
            loops: JoinSet::new(),
            commands: JoinSet::new(),
        }
    }

    pub fn mode(&self) -> ControlMode {
        match self.run {
            Some(_) => self.rig.targets.snapshot().sub_mode.running_mode(),
            None => ControlMode::Idle,
        }
    }

    /// Start the three acquisition loops. Ignored while running.
    pub fn start(&mut self) {
        if let Some(run) = &self.run {
            debug!("Start ignored, session {} is running", run.session);
            return;
        }

        let session = self.rig.recorder.start_session();
        let (stop, stop_rx) = watch::channel(false);
        let run = RunContext {
            rig: self.rig.clone(),
            session,
            clock: SessionClock::start(),
            stop: StopSignal::new(stop_rx),
        };

        self.loops.spawn(tasks::attitude::attitude_loop(run.clone()));
        self.loops.spawn(tasks::loadcell::loadcell_loop(run.clone()));
        self.loops.spawn(tasks::stopwatch::stopwatch_loop(run));
        self.run = Some(RunHandle { stop, session });

        info!("Session {} started in {:?}", session, self.mode());
    }

    /// Signal the running loops to finish. Does not wait for them.
    pub fn stop(&mut self) {
        match self.run.take() {
            Some(run) => {
                // Receivers treat a dropped sender as stopped too
                let _ = run.stop.send(true);
                info!(
                    "Session {} stopping, {} rows buffered",
                    run.session,
                    self.rig.recorder.len()
                );
            }
            None => debug!("Stop ignored, already idle"),
        }
    }

    /// Apply one command
    pub fn handle(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::AutoLevel => self.rig.targets.enter_autolevel(),
            Command::Angle => self.rig.targets.enter_manual(),
            Command::UpdateSliders {
                pitch_target,
                roll_target,
            } => self.rig.targets.update_sliders(pitch_target, roll_target),
            Command::Weigh => {
                self.commands.spawn(tasks::commands::weigh(self.rig.clone()));
            }
            Command::Tare => {
                self.commands.spawn(tasks::commands::tare(self.rig.clone()));
            }
            Command::SaveToFile => {
                self.commands.spawn(tasks::commands::save(self.rig.clone()));
            }
        }
        self.reap();
    }

    /// Parse and apply an inbound message; malformed ones are dropped
    pub fn dispatch(&mut self, message: &InboundMessage) {
        match Command::parse(message) {
            Ok(command) => self.handle(command),
            Err(e) => warn!("Dropping message: {}", e),
        }
    }

    /// Consume inbound messages until the queue closes
    pub async fn run(&mut self, inbound: &mut mpsc::Receiver<InboundMessage>) {
        info!("Coordinator ready");
        while let Some(message) = inbound.recv().await {
            self.dispatch(&message);
        }
        info!("Command queue closed");
    }

    /// Stop the current run and wait for every task to finish
    pub async fn shutdown(&mut self) {
        self.stop();
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(result) = self.loops.join_next().await {
                log_join(result);
            }
            while let Some(result) = self.commands.join_next().await {
                log_join(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!("Tasks still running after {:?}, aborting", SHUTDOWN_GRACE);
            self.loops.abort_all();
            self.commands.abort_all();
        }
        if let Some(command) = try_lock(&self.rig.actuators).and_then(|bank| bank.last_command()) {
            info!("Actuators holding {:?}", command);
        }
        info!("Coordinator shut down");
    }

    /// Collect finished tasks without waiting
    fn reap(&mut self) {
        while let Some(result) = self.loops.try_join_next() {
            log_join(result);
        }
        while let Some(result) = self.commands.try_join_next() {
            log_join(result);
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            warn!("Task panicked: {}", e);
        }
    }
}
