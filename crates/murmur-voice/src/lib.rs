//! Voice connection lifecycle for the murmur speech agent.
//!
//! One outbound voice session is kept per process. The pieces, leaves first:
//!
//! - [`backoff`]: pure retry delay and cooldown policy.
//! - [`state`]: the single owner of the live connection handle.
//! - [`establisher`]: the only code that issues connect calls, with bounded,
//!   classified retries.
//! - [`session`]: the actor that reconciles the session against requested
//!   channels and serializes playback.
//! - [`observer`]: turns external membership changes and faults into
//!   session commands.
//! - [`tts`]: speech synthesis backends.
//! - [`transport`]: the seam to the voice backend, with process and loopback
//!   implementations.

pub mod backoff;
pub mod config;
pub mod error;
pub mod establisher;
pub mod observer;
pub mod playback;
pub mod session;
pub mod state;
pub mod transport;
pub mod tts;

pub use backoff::BackoffPolicy;
pub use config::{ConnectionConfig, TransportConfig, TransportKind, TtsConfig};
pub use error::{ConnectError, VoiceError};
pub use observer::{DisconnectObserver, Reaction, TrackedMember};
pub use playback::{Rejected, Started};
pub use session::{Ready, TeardownReason, Unready, VoiceSession};
pub use state::ConnectionSnapshot;
pub use transport::{
    FailureClass, LoopbackTransport, ProcessSinkTransport, TransportError, VoiceConnection,
    VoiceTransport,
};
pub use tts::{SpeechSynthesizer, TtsService};
