use super::{TransportError, VoiceConnection, VoiceTransport};
use async_trait::async_trait;
use murmur_types::SessionTarget;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

const DEFAULT_BYTES_PER_SECOND: u64 = 44_100;

/// Transport that backs every connection with a long-lived sink process.
///
/// The sink (an audio player, a bridge to a voice gateway, ...) receives the
/// audio stream on stdin. The connection is alive for as long as the process
/// runs. Only one sink may exist at a time; connecting while a previous sink
/// still occupies the slot is reported as an already-connected conflict.
///
/// A pipe accepts audio faster than the sink plays it, so a playback is held
/// for as long as the audio lasts at `bytes_per_second`.
#[derive(Debug, Clone)]
pub struct ProcessSinkTransport {
    program: String,
    args: Vec<String>,
    bytes_per_second: u64,
    slot: Arc<Mutex<Option<Arc<SinkProcess>>>>,
}

#[derive(Debug)]
struct SinkProcess {
    child: Mutex<Child>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    severed: AtomicBool,
}

impl SinkProcess {
    fn is_running(&self) -> bool {
        if self.severed.load(Ordering::SeqCst) {
            return false;
        }
        match self.child.lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            Err(_) => false,
        }
    }

    fn kill(&self) {
        self.severed.store(true, Ordering::SeqCst);
        if let Ok(mut child) = self.child.lock() {
            if let Err(e) = child.start_kill() {
                debug!("sink process already exited: {}", e);
            }
        }
    }
}

impl ProcessSinkTransport {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            bytes_per_second: DEFAULT_BYTES_PER_SECOND,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets the rate at which the sink consumes audio.
    pub fn with_byte_rate(mut self, bytes_per_second: u64) -> Self {
        self.bytes_per_second = bytes_per_second.max(1);
        self
    }

    fn render_args(&self, target: &SessionTarget) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{channel_id}", &target.channel_id.to_string())
                    .replace("{channel}", &target.name)
            })
            .collect()
    }

    fn lock_slot(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<Arc<SinkProcess>>>, TransportError> {
        self.slot
            .lock()
            .map_err(|_| TransportError::Other("sink slot lock poisoned".to_string()))
    }
}

#[async_trait]
impl VoiceTransport for ProcessSinkTransport {
    async fn connect(
        &self,
        target: &SessionTarget,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        if self.program.is_empty() {
            return Err(TransportError::Other(
                "sink program is not configured".to_string(),
            ));
        }

        let mut slot = self.lock_slot()?;
        if let Some(existing) = slot.as_ref() {
            if existing.is_running() {
                return Err(TransportError::AlreadyConnected);
            }
            *slot = None;
        }

        let mut child = Command::new(&self.program)
            .args(self.render_args(target))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TransportError::Other(format!("failed to spawn sink {}: {}", self.program, e))
            })?;

        let stdin = child.stdin.take();
        let process = Arc::new(SinkProcess {
            child: Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            severed: AtomicBool::new(false),
        });
        *slot = Some(process.clone());
        drop(slot);

        info!(channel = %target, program = %self.program, "sink process started");
        Ok(Box::new(ProcessSinkConnection {
            target: target.clone(),
            process,
            playing: Arc::new(AtomicBool::new(false)),
            bytes_per_second: self.bytes_per_second,
            slot: self.slot.clone(),
        }))
    }

    async fn reset(&self) {
        let orphan = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(process) = orphan {
            warn!("killing orphaned sink process");
            process.kill();
        }
    }
}

struct ProcessSinkConnection {
    target: SessionTarget,
    process: Arc<SinkProcess>,
    playing: Arc<AtomicBool>,
    bytes_per_second: u64,
    slot: Arc<Mutex<Option<Arc<SinkProcess>>>>,
}

impl ProcessSinkConnection {
    fn release(&self) {
        self.process.kill();
        if let Ok(mut slot) = self.slot.lock() {
            if slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &self.process))
            {
                *slot = None;
            }
        }
    }
}

#[async_trait]
impl VoiceConnection for ProcessSinkConnection {
    fn is_alive(&self) -> bool {
        self.process.is_running()
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
        let finishes_at = tokio::time::Instant::now() + duration;
        debug!(channel = %self.target, bytes = audio.len(), ?duration, "sink playback started");

        let process = self.process.clone();
        let playing = self.playing.clone();
        let channel = self.target.name.clone();
        tokio::spawn(async move {
            let streamed = {
                let mut stdin = process.stdin.lock().await;
                match stdin.as_mut() {
                    Some(pipe) => match pipe.write_all(&audio).await {
                        Ok(()) => pipe.flush().await,
                        Err(e) => Err(e),
                    },
                    None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink stdin is closed")),
                }
            };
            match streamed {
                Ok(()) => tokio::time::sleep_until(finishes_at).await,
                Err(e) => {
                    warn!(%channel, "failed to stream audio to sink: {}", e);
                    process.severed.store(true, Ordering::SeqCst);
                }
            }
            playing.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.release();
        self.process.stdin.lock().await.take();
        info!(channel = %self.target, "sink process stopped");
        Ok(())
    }
}

impl Drop for ProcessSinkConnection {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn lounge() -> SessionTarget {
        SessionTarget::new(3, "lounge")
    }

    #[test]
    fn args_substitute_channel() {
        let transport = ProcessSinkTransport::new(
            "sink",
            vec!["--room={channel}".to_string(), "{channel_id}".to_string()],
        );
        assert_eq!(
            transport.render_args(&lounge()),
            vec!["--room=lounge".to_string(), "3".to_string()]
        );
    }

    #[tokio::test]
    async fn unconfigured_program_is_fatal() {
        let transport = ProcessSinkTransport::new("", Vec::new());
        let err = transport.connect(&lounge()).await.err().unwrap();
        assert_eq!(err.classify(), crate::transport::FailureClass::UnclassifiedFatal);
    }

    #[tokio::test]
    async fn second_sink_conflicts_until_first_is_gone() {
        let transport = ProcessSinkTransport::new("cat", Vec::new());
        let mut first = transport.connect(&lounge()).await.unwrap();
        assert!(first.is_alive());

        let err = transport.connect(&lounge()).await.err().unwrap();
        assert_eq!(err, TransportError::AlreadyConnected);

        first.disconnect().await.unwrap();
        assert!(!first.is_alive());

        let mut second = transport.connect(&lounge()).await.unwrap();
        assert!(second.is_alive());
        second.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn second_play_is_refused_until_the_audio_has_played() {
        let transport = ProcessSinkTransport::new("cat", Vec::new()).with_byte_rate(1_000);
        let mut conn = transport.connect(&lounge()).await.unwrap();

        conn.play(vec![0; 4_096]).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(conn.is_playing());

        let err = conn.play(vec![0; 16]).unwrap_err();
        assert_eq!(err, TransportError::Other("already playing audio".to_string()));
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn playback_clears_after_its_duration() {
        let transport = ProcessSinkTransport::new("cat", Vec::new()).with_byte_rate(1_000);
        let mut conn = transport.connect(&lounge()).await.unwrap();

        conn.play(vec![0; 100]).unwrap();
        assert!(conn.is_playing());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!conn.is_playing());

        conn.play(vec![0; 100]).unwrap();
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn sink_that_never_reads_still_holds_playback() {
        let transport = ProcessSinkTransport::new(
            "sh",
            vec!["-c".to_string(), "sleep 30".to_string()],
        );
        let mut conn = transport.connect(&lounge()).await.unwrap();

        conn.play(vec![0; 4_096]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(conn.is_playing());
        assert!(conn.play(vec![0; 4_096]).is_err());
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn play_after_sink_exit_is_not_alive() {
        let transport = ProcessSinkTransport::new("true", Vec::new());
        let mut conn = transport.connect(&lounge()).await.unwrap();

        for _ in 0..100 {
            if !conn.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!conn.is_alive());
        assert_eq!(conn.play(vec![0; 16]).unwrap_err(), TransportError::NotAlive);
        assert!(!conn.is_playing());
    }

    #[tokio::test]
    async fn reset_frees_the_slot() {
        let transport = ProcessSinkTransport::new("cat", Vec::new());
        let leaked = transport.connect(&lounge()).await.unwrap();
        transport.reset().await;
        assert!(!leaked.is_alive());

        let mut fresh = transport.connect(&lounge()).await.unwrap();
        assert!(fresh.is_alive());
        fresh.disconnect().await.unwrap();
    }
}
