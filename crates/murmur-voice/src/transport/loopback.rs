use super::{TransportError, VoiceConnection, VoiceTransport};
use async_trait::async_trait;
use murmur_types::SessionTarget;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct LoopbackStats {
    connects: AtomicU64,
    disconnects: AtomicU64,
    live: AtomicUsize,
    bytes_played: AtomicU64,
    alive_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

/// In-memory transport for dry runs.
///
/// Connections always succeed and audio goes nowhere; playback occupies the
/// connection for as long as the audio would take at `bytes_per_second`.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    bytes_per_second: u64,
    stats: Arc<LoopbackStats>,
}

impl LoopbackTransport {
    pub fn new(bytes_per_second: u64) -> Self {
        Self {
            bytes_per_second: bytes_per_second.max(1),
            stats: Arc::new(LoopbackStats::default()),
        }
    }

    /// Number of connect calls served.
    pub fn connects(&self) -> u64 {
        self.stats.connects.load(Ordering::SeqCst)
    }

    /// Number of explicit disconnect calls.
    pub fn disconnect_calls(&self) -> u64 {
        self.stats.disconnects.load(Ordering::SeqCst)
    }

    /// Connections opened and not yet disconnected or dropped.
    pub fn live_connections(&self) -> usize {
        self.stats.live.load(Ordering::SeqCst)
    }

    pub fn bytes_played(&self) -> u64 {
        self.stats.bytes_played.load(Ordering::SeqCst)
    }

    /// Marks every open connection as dead, as if the remote side dropped them.
    pub fn sever_all(&self) {
        if let Ok(flags) = self.stats.alive_flags.lock() {
            for flag in flags.iter() {
                flag.store(false, Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl VoiceTransport for LoopbackTransport {
    async fn connect(
        &self,
        target: &SessionTarget,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        if let Ok(mut flags) = self.stats.alive_flags.lock() {
            flags.retain(|flag| flag.load(Ordering::SeqCst));
            flags.push(alive.clone());
        }
        info!(channel = %target, "loopback voice connection opened");
        Ok(Box::new(LoopbackConnection {
            target: target.clone(),
            alive,
            playing: Arc::new(AtomicBool::new(false)),
            released: false,
            bytes_per_second: self.bytes_per_second,
            stats: self.stats.clone(),
        }))
    }
}

struct LoopbackConnection {
    target: SessionTarget,
    alive: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    released: bool,
    bytes_per_second: u64,
    stats: Arc<LoopbackStats>,
}

impl LoopbackConnection {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.alive.store(false, Ordering::SeqCst);
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl VoiceConnection for LoopbackConnection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn channel_name(&self) -> Result<String, TransportError> {
        if self.is_alive() {
            Ok(self.target.name.clone())
        } else {
            Err(TransportError::NotAlive)
        }
    }

    fn play(&mut self, audio: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::NotAlive);
        }
        if self.playing.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Other("already playing audio".to_string()));
        }
        let duration = Duration::from_secs_f64(audio.len() as f64 / self.bytes_per_second as f64);
        self.stats
            .bytes_played
            .fetch_add(audio.len() as u64, Ordering::SeqCst);
        debug!(channel = %self.target, bytes = audio.len(), ?duration, "loopback playback started");

        let playing = self.playing.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            playing.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        self.release();
        info!(channel = %self.target, "loopback voice connection closed");
        Ok(())
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.release();
    }
}
