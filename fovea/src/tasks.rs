//! Engine startup and the cooperative loop set.
//!
//! The engine thread runs a current-thread tokio runtime multiplexing
//! three loops: scene ingest, gaze ingest, and the command handler. The
//! loops share the gaze mapper single-threaded (`Rc<RefCell>`) and a stop
//! flag checked at loop-iteration granularity; the only links back to the
//! host are the command and output channels.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use companion::{CompanionClient, GazeStream, SceneStream, TimeEchoClient};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use surface::SurfaceDefinition;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::ConnectError;
use crate::clock::{self, HostClock};
use crate::command::{Command, MappedGazeSample, Output, PupilSample};
use crate::config::EngineConfig;
use crate::detector::MarkerDetector;
use crate::mapper::GazeMapper;

/// Everything produced by a successful startup.
struct EngineParts {
    client: CompanionClient,
    scene: SceneStream,
    gaze: GazeStream,
    mapper: GazeMapper,
    /// Estimated device-minus-engine offset, if probing succeeded
    device_engine_offset: Option<f64>,
}

/// Engine thread entry point.
///
/// Reports the startup outcome over `startup_tx` exactly once, then (on
/// success) runs the loop set until stopped. Clears `running` on exit.
pub(crate) fn run(
    config: EngineConfig,
    detector: Box<dyn MarkerDetector>,
    clock: HostClock,
    commands: Receiver<Command>,
    outputs: Sender<Output>,
    startup_tx: Sender<Result<(), ConnectError>>,
    running: Arc<AtomicBool>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = startup_tx.send(Err(ConnectError::Runtime(e.to_string())));
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    runtime.block_on(async {
        let parts = match startup(&config, detector, clock, &outputs).await {
            Ok(parts) => {
                let _ = startup_tx.send(Ok(()));
                parts
            }
            Err(e) => {
                let _ = startup_tx.send(Err(e));
                return;
            }
        };
        run_loops(parts, &config, clock, commands, outputs).await;
    });

    running.store(false, Ordering::SeqCst);
    info!("engine thread exiting");
}

/// Connect to the device, estimate the clock offset, and open both
/// sensor subscriptions. Any failure here (other than offset estimation)
/// aborts startup.
async fn startup(
    config: &EngineConfig,
    detector: Box<dyn MarkerDetector>,
    clock: HostClock,
    outputs: &Sender<Output>,
) -> Result<EngineParts, ConnectError> {
    let mut client = CompanionClient::connect(&config.address, config.port).await?;
    let status = client.get_status().await?;
    info!("connected to companion device {}", status.serial);

    let calibration = client.get_calibration().await?;

    // Offset estimation is best-effort: without it the engine runs with
    // uncorrected timestamps
    let estimate = match TimeEchoClient::connect(&status.time_echo).await {
        Ok(mut echo) => {
            clock::estimate_offset(
                &mut echo,
                clock,
                config.probe_count,
                Duration::from_millis(config.probe_spacing_ms),
            )
            .await
        }
        Err(e) => {
            warn!("time echo endpoint unreachable, timestamps uncorrected: {e}");
            None
        }
    };
    if let Some(est) = estimate {
        let _ = outputs.send(Output::TimeOffset(est));
    }

    let scene = SceneStream::subscribe(&status.scene).await?;
    let gaze = GazeStream::subscribe(&status.gaze).await?;

    Ok(EngineParts {
        client,
        scene,
        gaze,
        mapper: GazeMapper::new(calibration, detector),
        device_engine_offset: estimate.map(|e| e.mean),
    })
}

/// Run the ingest tasks and the command handler until stopped.
async fn run_loops(
    parts: EngineParts,
    config: &EngineConfig,
    clock: HostClock,
    commands: Receiver<Command>,
    outputs: Sender<Output>,
) {
    let EngineParts {
        client,
        scene,
        gaze,
        mapper,
        device_engine_offset,
    } = parts;

    let mapper = Rc::new(RefCell::new(mapper));
    let stop = Arc::new(AtomicBool::new(false));
    let poll_interval = Duration::from_millis(config.command_poll_interval_ms.max(1));

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let mut scene_task = tokio::task::spawn_local(scene_loop(
                scene,
                Rc::clone(&mapper),
                Arc::clone(&stop),
            ));
            let mut gaze_task = tokio::task::spawn_local(gaze_loop(
                gaze,
                Rc::clone(&mapper),
                Arc::clone(&stop),
                outputs,
                config.clone(),
            ));

            command_loop(
                client,
                Rc::clone(&mapper),
                Arc::clone(&stop),
                commands,
                config,
                clock,
                device_engine_offset,
                poll_interval,
            )
            .await;

            // Give parked ingest tasks one polling interval to observe
            // the flag; a subscription with nothing left to deliver is
            // then closed by dropping it
            let drained = tokio::time::timeout(poll_interval, async {
                let _ = (&mut scene_task).await;
                let _ = (&mut gaze_task).await;
            })
            .await;
            if drained.is_err() {
                abort_ingest(scene_task, "scene").await;
                abort_ingest(gaze_task, "gaze").await;
            }
        })
        .await;
}

async fn abort_ingest(task: JoinHandle<()>, name: &str) {
    if task.is_finished() {
        let _ = task.await;
        return;
    }
    debug!("{name} ingest still parked at shutdown, closing subscription");
    task.abort();
    let _ = task.await;
}

/// Scene ingest: one frame per iteration, fed to the fuser for geometry
/// refresh. A read failure ends this loop only.
async fn scene_loop(mut stream: SceneStream, mapper: Rc<RefCell<GazeMapper>>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        match stream.next().await {
            Ok(frame) => {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                mapper.borrow_mut().process_scene(&frame);
            }
            Err(e) => {
                warn!("scene stream read failed, ending scene ingest: {e}");
                break;
            }
        }
    }
    debug!("scene ingest loop stopped");
}

/// Gaze ingest: one datum per iteration, filtered, projected, and pushed
/// to the output queue. A read failure ends this loop only.
async fn gaze_loop(
    mut stream: GazeStream,
    mapper: Rc<RefCell<GazeMapper>>,
    stop: Arc<AtomicBool>,
    outputs: Sender<Output>,
    config: EngineConfig,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let datum = match stream.next().await {
            Ok(datum) => datum,
            Err(e) => {
                warn!("gaze stream read failed, ending gaze ingest: {e}");
                break;
            }
        };
        if stop.load(Ordering::Relaxed) {
            break;
        }

        if let Some(threshold) = config.gaze_confidence_threshold {
            if datum.confidence.is_some_and(|c| c < threshold) {
                continue;
            }
        }

        if config.pupillometry_only {
            let _ = outputs.send(Output::Pupil(PupilSample {
                device_timestamp: datum.timestamp,
                left: datum.left,
                right: datum.right,
            }));
            continue;
        }

        let Some(result) = mapper.borrow().process_gaze(&datum) else {
            continue;
        };
        for point in result.points {
            let _ = outputs.send(Output::MappedGaze(MappedGazeSample {
                device_timestamp: datum.timestamp,
                surface: result.surface,
                point,
                raw: datum.point(),
                left: datum.left,
                right: datum.right,
            }));
        }
    }
    debug!("gaze ingest loop stopped");
}

/// Command handler: bounded-interval tick draining every queued command.
/// No dispatch failure stops the engine; only `Stop` (or a disconnected
/// host) ends this loop.
#[allow(clippy::too_many_arguments)]
async fn command_loop(
    mut client: CompanionClient,
    mapper: Rc<RefCell<GazeMapper>>,
    stop: Arc<AtomicBool>,
    commands: Receiver<Command>,
    config: &EngineConfig,
    clock: HostClock,
    device_engine_offset: Option<f64>,
    poll_interval: Duration,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        tokio::time::sleep(poll_interval).await;

        loop {
            let command = match commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Host side is gone; treat as an implicit stop
                    debug!("command channel disconnected");
                    Command::Stop
                }
            };

            match command {
                Command::Stop => {
                    info!("stop command received, shutting down engine loops");
                    stop.store(true, Ordering::Relaxed);
                    client.close().await;
                    return;
                }
                Command::UpdateSurface {
                    markers,
                    frame_size,
                } => match SurfaceDefinition::from_keys(markers, frame_size) {
                    Ok(definition) => {
                        let mut mapper = mapper.borrow_mut();
                        mapper.clear_surfaces();
                        let handle = mapper.add_surface(definition);
                        debug!("surface replaced, handle {handle:?}");
                    }
                    Err(e) => warn!("rejected surface update, keeping prior surface: {e}"),
                },
                Command::SetRecording(should_record) => {
                    if !config.capture_recording {
                        debug!("device capture recording disabled by configuration");
                        continue;
                    }
                    let result = if should_record {
                        client.recording_start().await
                    } else {
                        client.recording_stop_and_save().await
                    };
                    if let Err(e) = result {
                        let verb = if should_record { "start" } else { "stop" };
                        warn!("failed to {verb} device recording: {e}");
                    }
                }
                Command::SendEvent { name, timestamp } => {
                    let timestamp = timestamp
                        .unwrap_or_else(|| clock.now() + device_engine_offset.unwrap_or(0.0));
                    if let Err(e) = client.send_event(&name, Some(timestamp)).await {
                        warn!("failed to send event {name:?}: {e}");
                    }
                }
            }
        }
    }
    client.close().await;
}
