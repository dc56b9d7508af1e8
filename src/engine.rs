// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    io,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, warn, Level, Span};

use crate::{
    midi::{self, DispatchError},
    performance::{self, DecodeError, Performance},
    playsync::CancelHandle,
};

mod priority;

/// The slowest supported tempo factor.
pub const MIN_TEMPO: f64 = 0.25;

/// The fastest supported tempo factor.
pub const MAX_TEMPO: f64 = 2.0;

/// How long stop waits for the scheduling thread before detaching it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(500);

const MIDI_CHANNELS: u8 = 16;
const MIDI_NOTES: u8 = 128;

/// Notifications that are dropped when nobody drains them.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Clamps a tempo factor into the supported range. NaN clamps to the maximum.
pub fn clamp_tempo(tempo: f64) -> f64 {
    tempo.min(MAX_TEMPO).max(MIN_TEMPO)
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Device(#[from] midi::DeviceError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unable to start the scheduling thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Notifications published by the scheduling thread.
#[derive(Debug)]
pub enum PlaybackEvent {
    /// The scheduling thread started its first pass.
    Started { position: Duration },
    /// Playback reached the loop end and restarted from the first event.
    Looped { pass: u64 },
    /// Playback ran through the whole performance.
    Finished { position: Duration },
    /// The device failed mid playback. Notes off have already been sent.
    Interrupted(DispatchError),
}

/// The loop region. The start is where the position lands after a loop, the end is the
/// position that triggers a loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopPoints {
    pub start: Duration,
    pub end: Duration,
}

struct LoopRegion {
    points: LoopPoints,
    /// Set once the end was chosen explicitly, so loading a new performance keeps it.
    end_overridden: bool,
}

/// Playback state shared between the engine and its scheduling thread.
struct State {
    /// The generation of the active playback, zero when stopped.
    playing: AtomicU64,
    generations: AtomicU64,
    looping: AtomicBool,
    /// f64 bits.
    tempo: AtomicU64,
    /// Nanoseconds of musical time.
    position: AtomicU64,
    loop_region: Mutex<LoopRegion>,
}

impl State {
    fn new() -> State {
        State {
            playing: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            looping: AtomicBool::new(false),
            tempo: AtomicU64::new(1.0f64.to_bits()),
            position: AtomicU64::new(0),
            loop_region: Mutex::new(LoopRegion {
                points: LoopPoints {
                    start: Duration::ZERO,
                    end: Duration::ZERO,
                },
                end_overridden: false,
            }),
        }
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire) != 0
    }

    /// Marks a new playback as active and returns its generation.
    fn begin(&self) -> u64 {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        self.playing.store(generation, Ordering::Release);
        generation
    }

    /// Clears the playing flag only if it still belongs to the given generation.
    fn finish(&self, generation: u64) -> bool {
        self.playing
            .compare_exchange(generation, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.playing.load(Ordering::Acquire) == generation
    }

    fn halt(&self) {
        self.playing.store(0, Ordering::Release);
    }

    fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo.load(Ordering::Relaxed))
    }

    fn set_tempo(&self, tempo: f64) {
        self.tempo
            .store(clamp_tempo(tempo).to_bits(), Ordering::Relaxed);
    }

    fn position(&self) -> Duration {
        Duration::from_nanos(self.position.load(Ordering::Relaxed))
    }

    fn set_position(&self, position: Duration) {
        self.position.store(nanos(position), Ordering::Relaxed);
    }

    /// Only the scheduling thread advances the position.
    fn advance(&self, delay: Duration) -> Duration {
        let position = self
            .position
            .load(Ordering::Relaxed)
            .saturating_add(nanos(delay));
        self.position.store(position, Ordering::Relaxed);
        Duration::from_nanos(position)
    }

    fn loop_points(&self) -> LoopPoints {
        self.loop_region.lock().points
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Handles to a running scheduling thread.
struct Task {
    cancel: CancelHandle,
    /// Disconnects once the scheduling thread has exited.
    done: Receiver<()>,
    join: JoinHandle<()>,
}

/// Plays a loaded performance to an output device in real time.
pub struct Engine {
    device_name: String,
    /// The output device. Held by the scheduling thread for each send and by the notes off
    /// sweep for its whole duration, so the two never interleave.
    output: Arc<Mutex<Box<dyn midi::Device>>>,
    state: Arc<State>,
    performance: Option<Arc<Performance>>,
    task: Option<Task>,
    stop_timeout: Duration,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
    span: Span,
}

impl Engine {
    /// Creates an engine that owns the given device.
    pub fn new(device: Box<dyn midi::Device>) -> Engine {
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
        Engine {
            device_name: device.name().to_string(),
            output: Arc::new(Mutex::new(device)),
            state: Arc::new(State::new()),
            performance: None,
            task: None,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            events_tx,
            events_rx,
            span: span!(Level::INFO, "engine"),
        }
    }

    /// Binds to the named output device (or the first available one) and creates an
    /// engine for it. Fails if there is no output device at all.
    pub fn connect(device_name: Option<&str>) -> Result<Engine, EngineError> {
        Ok(Engine::new(midi::get_device(device_name)?))
    }

    /// Sets how long stop waits for the scheduling thread to exit.
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Engine {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Replaces the current performance. Any active playback is stopped first.
    pub fn load(&mut self, performance: Performance) {
        self.stop();

        let span = self.span.clone();
        let _enter = span.enter();

        self.state.set_position(Duration::ZERO);
        {
            let mut region = self.state.loop_region.lock();
            if !region.end_overridden {
                region.points.end = performance.total_duration();
            }
        }

        info!(
            events = performance.len(),
            duration = ?performance.total_duration(),
            "Loaded performance."
        );
        self.performance = Some(Arc::new(performance));
    }

    /// Decodes the given file and loads it. On failure the current performance stays
    /// loaded and nothing is stopped.
    pub fn load_file(&mut self, path: &Path) -> Result<(), DecodeError> {
        let performance = performance::decode(path)?;
        self.load(performance);
        Ok(())
    }

    /// Starts playback, restarting it if it is already running. With a start position,
    /// the position counter is set before starting, otherwise it resumes from its current
    /// value. Does nothing if no performance is loaded.
    pub fn play(&mut self, start_position: Option<Duration>) -> Result<(), EngineError> {
        let performance = match self.performance.as_ref() {
            Some(performance) => performance.clone(),
            None => {
                let _enter = self.span.enter();
                info!("No performance loaded, nothing to play.");
                return Ok(());
            }
        };

        if self.state.is_playing() {
            self.stop();
        } else if let Some(task) = self.task.take() {
            // The previous playback finished on its own, reap its thread.
            self.join_task(task);
        }

        let span = self.span.clone();
        let _enter = span.enter();

        if let Some(start_position) = start_position {
            self.state.set_position(start_position);
        }

        let generation = self.state.begin();
        let cancel = CancelHandle::new();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let scheduler = Scheduler {
            performance,
            output: self.output.clone(),
            state: self.state.clone(),
            cancel: cancel.clone(),
            events_tx: self.events_tx.clone(),
            events_rx: self.events_rx.clone(),
            generation,
        };
        let priority = priority::scheduler_thread_priority();

        let spawned = thread::Builder::new()
            .name("midisift-scheduler".to_string())
            .spawn(move || {
                let _done = done_tx;
                priority::raise_current_thread(priority);
                scheduler.run();
            });

        match spawned {
            Ok(join) => {
                info!(
                    device = self.device_name,
                    position = ?self.state.position(),
                    tempo = self.state.tempo(),
                    looping = self.state.is_looping(),
                    "Playback started."
                );
                self.task = Some(Task {
                    cancel,
                    done: done_rx,
                    join,
                });
                Ok(())
            }
            Err(e) => {
                self.state.finish(generation);
                error!(err = %e, "Unable to start the scheduling thread.");
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Stops playback and sends a note off for every note on every channel. Safe to call
    /// at any time, including when nothing is playing.
    pub fn stop(&mut self) {
        let span = self.span.clone();
        let _enter = span.enter();

        self.state.halt();
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
            self.join_task(task);
        }

        all_notes_off(&self.output);
        info!(position = ?self.state.position(), "Playback stopped.");
    }

    /// Waits, bounded by the stop timeout, for the scheduling thread to exit.
    fn join_task(&self, task: Task) {
        match task.done.recv_timeout(self.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout = ?self.stop_timeout,
                    "Scheduling thread did not stop in time, detaching it."
                );
            }
            _ => {
                if task.join.join().is_err() {
                    error!("Scheduling thread panicked.");
                }
            }
        }
    }

    /// Sets the tempo factor, clamped to [MIN_TEMPO, MAX_TEMPO]. Applies from the next
    /// event wait onward.
    pub fn set_tempo(&self, tempo: f64) {
        self.state.set_tempo(tempo);
        let _enter = self.span.enter();
        debug!(tempo = self.state.tempo(), "Tempo set.");
    }

    /// Sets the loop region verbatim. A start after the end is accepted; the loop then
    /// triggers after every event.
    pub fn set_loop_points(&self, start: Duration, end: Duration) {
        let mut region = self.state.loop_region.lock();
        region.points = LoopPoints { start, end };
        region.end_overridden = true;
    }

    /// Resets the loop region to the whole of the loaded performance.
    pub fn clear_loop_points(&self) {
        let end = self
            .performance
            .as_ref()
            .map(|performance| performance.total_duration())
            .unwrap_or_default();
        let mut region = self.state.loop_region.lock();
        region.points = LoopPoints {
            start: Duration::ZERO,
            end,
        };
        region.end_overridden = false;
    }

    /// Flips looping and returns the new value. Observed at the next loop check.
    pub fn toggle_loop(&self) -> bool {
        let looping = !self.state.looping.fetch_xor(true, Ordering::Relaxed);
        let _enter = self.span.enter();
        debug!(looping, "Looping toggled.");
        looping
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn is_looping(&self) -> bool {
        self.state.is_looping()
    }

    /// The musical position of the playback, unaffected by tempo.
    pub fn position(&self) -> Duration {
        self.state.position()
    }

    pub fn tempo(&self) -> f64 {
        self.state.tempo()
    }

    pub fn loop_points(&self) -> LoopPoints {
        self.state.loop_points()
    }

    pub fn performance(&self) -> Option<&Performance> {
        self.performance.as_deref()
    }

    /// A receiver for playback notifications. Dispatch failures are surfaced here.
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.output.lock().close();
    }
}

enum Outcome {
    Finished,
    Cancelled,
}

/// The state moved into the scheduling thread.
struct Scheduler {
    performance: Arc<Performance>,
    output: Arc<Mutex<Box<dyn midi::Device>>>,
    state: Arc<State>,
    cancel: CancelHandle,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
    generation: u64,
}

impl Scheduler {
    fn run(self) {
        let span = span!(Level::INFO, "scheduler", generation = self.generation);
        let _enter = span.enter();
        let _finish = FinishGuard {
            output: &self.output,
            state: &self.state,
            generation: self.generation,
        };

        self.publish(PlaybackEvent::Started {
            position: self.state.position(),
        });

        match self.schedule() {
            Ok(Outcome::Finished) => {
                self.state.finish(self.generation);
                let position = self.state.position();
                info!(position = ?position, "Playback finished.");
                self.publish(PlaybackEvent::Finished { position });
            }
            Ok(Outcome::Cancelled) => {
                debug!("Playback cancelled.");
            }
            Err(e) => {
                error!(err = %e, "Playback interrupted.");
                all_notes_off(&self.output);
                self.state.finish(self.generation);
                self.publish(PlaybackEvent::Interrupted(e));
            }
        }
    }

    fn schedule(&self) -> Result<Outcome, DispatchError> {
        let events = self.performance.events();
        if events.is_empty() {
            return Ok(Outcome::Finished);
        }
        // A performance without any duration would loop without ever waiting.
        let can_loop = !self.performance.total_duration().is_zero();

        let mut pass: u64 = 0;
        'pass: loop {
            for event in events {
                let wait = scaled_wait(event.delay(), self.state.tempo());
                if self.cancel.sleep(wait) {
                    return Ok(Outcome::Cancelled);
                }

                let position = self.state.advance(event.delay());
                if let Some(live_event) = event.live_event() {
                    if !self.dispatch(live_event)? {
                        return Ok(Outcome::Cancelled);
                    }
                }

                if can_loop && self.state.is_looping() {
                    let points = self.state.loop_points();
                    if position >= points.end {
                        self.state.set_position(points.start);
                        pass += 1;
                        debug!(pass, position = ?points.start, "Looping.");
                        self.publish(PlaybackEvent::Looped { pass });
                        continue 'pass;
                    }
                }
            }

            if !(can_loop && self.state.is_looping()) {
                return Ok(Outcome::Finished);
            }
            pass += 1;
        }
    }

    /// Sends the event unless playback was cancelled. Returns false if cancelled.
    fn dispatch(&self, event: LiveEvent<'static>) -> Result<bool, DispatchError> {
        let mut output = self.output.lock();
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        output.send(event)?;
        Ok(true)
    }

    /// Publishes a notification without blocking. When nobody drains the channel, routine
    /// notifications are dropped, but an interruption evicts the oldest one instead.
    fn publish(&self, event: PlaybackEvent) {
        let event = match self.events_tx.try_send(event) {
            Err(TrySendError::Full(event)) => event,
            _ => return,
        };
        if !matches!(event, PlaybackEvent::Interrupted(_)) {
            debug!(event = ?event, "Playback event channel full, dropping event.");
            return;
        }

        let evicted = self.events_rx.try_recv().ok();
        warn!(evicted = ?evicted, "Playback event channel full, evicted the oldest event.");
        if let Err(TrySendError::Full(event)) = self.events_tx.try_send(event) {
            warn!(event = ?event, "Playback event channel full, dropping event.");
        }
    }
}

/// Clears the playing flag for its generation once the scheduling thread is done with it.
/// If the thread is unwinding, notes off are sent first.
struct FinishGuard<'a> {
    output: &'a Mutex<Box<dyn midi::Device>>,
    state: &'a State,
    generation: u64,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() && self.state.is_current(self.generation) {
            error!("Scheduling thread panicked.");
            all_notes_off(self.output);
        }
        self.state.finish(self.generation);
    }
}

/// The wall clock wait for a delay at the given tempo. Saturates instead of overflowing.
fn scaled_wait(delay: Duration, tempo: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() / tempo).unwrap_or(Duration::MAX)
}

/// Sends a note off for every note on every channel, whether or not it is believed to be
/// sounding. Errors are logged and swallowed.
fn all_notes_off(output: &Mutex<Box<dyn midi::Device>>) {
    let mut output = output.lock();
    let mut failures: usize = 0;
    let mut last_error = None;

    for channel in 0..MIDI_CHANNELS {
        for note in 0..MIDI_NOTES {
            let event = LiveEvent::Midi {
                channel: u4::from(channel),
                message: MidiMessage::NoteOff {
                    key: u7::from(note),
                    vel: u7::from(0),
                },
            };
            if let Err(e) = output.send(event) {
                failures += 1;
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => warn!(
            device = output.name(),
            failures,
            err = %e,
            "Errors while sending notes off."
        ),
        None => debug!(device = output.name(), "Sent notes off."),
    }
}
