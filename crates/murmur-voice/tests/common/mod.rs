#![allow(dead_code)]

use async_trait::async_trait;
use murmur_types::SessionTarget;
use murmur_voice::{ConnectionConfig, TransportError, VoiceConnection, VoiceTransport};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// How the next connect call behaves.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Connects and stays alive.
    Connect,
    /// Fails with the given transport error.
    Fail(TransportError),
    /// Never returns; only the connect timeout ends it.
    Hang,
    /// Reports success, but the connection is already dead.
    DeadOnArrival,
    /// Connects and stays alive, but its metadata probe fails.
    BrokenProbe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String),
    Disconnect(String),
    Play(String),
    Reset,
}

#[derive(Default)]
struct Script {
    outcomes: Mutex<VecDeque<Outcome>>,
    calls: Mutex<Vec<(Call, Instant)>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    connections: Mutex<Vec<(Arc<AtomicBool>, Arc<AtomicBool>)>>,
}

impl Script {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((call, Instant::now()));
    }
}

/// Transport whose connect outcomes are scripted up front.
///
/// Once the script runs out every connect succeeds.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let transport = Self::new();
        transport.push(outcomes);
        transport
    }

    pub fn push(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script.outcomes.lock().unwrap().extend(outcomes);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    pub fn connects(&self) -> usize {
        self.count(|c| matches!(c, Call::Connect(_)))
    }

    pub fn disconnects(&self) -> usize {
        self.count(|c| matches!(c, Call::Disconnect(_)))
    }

    pub fn plays(&self) -> usize {
        self.count(|c| matches!(c, Call::Play(_)))
    }

    pub fn resets(&self) -> usize {
        self.count(|c| matches!(c, Call::Reset))
    }

    /// Instants at which connect calls started.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.script
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(call, _)| matches!(call, Call::Connect(_)))
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn live(&self) -> usize {
        self.script.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive connections ever observed.
    pub fn max_live(&self) -> usize {
        self.script.max_live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running connect calls ever observed.
    pub fn max_in_flight(&self) -> usize {
        self.script.max_in_flight.load(Ordering::SeqCst)
    }

    /// Kills every open connection from the remote side.
    pub fn sever_all(&self) {
        for (alive, _) in self.script.connections.lock().unwrap().iter() {
            if alive.swap(false, Ordering::SeqCst) {
                self.script.live.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Marks every in-progress playback as finished.
    pub fn finish_playback(&self) {
        for (_, playing) in self.script.connections.lock().unwrap().iter() {
            playing.store(false, Ordering::SeqCst);
        }
    }
}

struct InFlight<'a>(&'a Script);

impl<'a> InFlight<'a> {
    fn enter(script: &'a Script) -> Self {
        let now = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(script)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceTransport for ScriptedTransport {
    async fn connect(
        &self,
        target: &SessionTarget,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        let _guard = InFlight::enter(&self.script);
        self.script.record(Call::Connect(target.name.clone()));
        let outcome = self
            .script
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Connect);

        let (alive, probe_ok) = match outcome {
            Outcome::Connect => (true, true),
            Outcome::BrokenProbe => (true, false),
            Outcome::DeadOnArrival => (false, true),
            Outcome::Fail(err) => return Err(err),
            Outcome::Hang => return std::future::pending().await,
        };

        let alive = Arc::new(AtomicBool::new(alive));
        let playing = Arc::new(AtomicBool::new(false));
        if alive.load(Ordering::SeqCst) {
            let now = self.script.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.script.max_live.fetch_max(now, Ordering::SeqCst);
        }
        self.script
            .connections
            .lock()
            .unwrap()
            .push((alive.clone(), playing.clone()));

        Ok(Box::new(ScriptedConnection {
            target: target.clone(),
            alive,
            playing,
            probe_ok,
            script: self.script.clone(),
        }))
    }

    async fn reset(&self) {
        self.script.record(Call::Reset);
    }
}

struct ScriptedConnection {
    target: SessionTarget,
    alive: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    probe_ok: bool,
    script: Arc<Script>,
}

#[async_trait]
impl VoiceConnection for ScriptedConnection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn channel_name(&self) -> Result<String, TransportError> {
        if self.probe_ok {
            Ok(self.target.name.clone())
        } else {
            Err(TransportError::Other("channel metadata unavailable".to_string()))
        }
    }

    fn play(&mut self, _audio: Vec<u8>) -> Result<(), TransportError> {
        self.script.record(Call::Play(self.target.name.clone()));
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.script
            .record(Call::Disconnect(self.target.name.clone()));
        if self.alive.swap(false, Ordering::SeqCst) {
            self.script.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.script.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub fn lounge() -> SessionTarget {
    SessionTarget::new(1, "lounge")
}

pub fn den() -> SessionTarget {
    SessionTarget::new(2, "den")
}

pub fn session_invalid() -> Outcome {
    Outcome::Fail(TransportError::Closed {
        code: 4006,
        reason: "Session no longer valid".to_string(),
    })
}

pub fn config() -> ConnectionConfig {
    ConnectionConfig::default()
}
