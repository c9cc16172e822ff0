//! Voice commands from speech transcripts.
//!
//! Matching is plain substring search over ordered keyword groups; the first
//! group with a hit wins. "stop and play" is therefore a stop.
//!
//! [`VoiceSession`] tracks the listening lifecycle around a continuous
//! recognizer: it decides whether to restart after an error or end-of-stream,
//! and maps each final transcript to a command.

use std::fmt;

use tracing::{debug, info, warn};

/// Commands the player understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceCommand {
    Stop,
    Play,
    SpatialOn,
    SpatialOff,
    VolumeUp,
    VolumeDown,
    Next,
    Previous,
}

impl fmt::Display for VoiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stop => "stop",
            Self::Play => "play",
            Self::SpatialOn => "spatial_on",
            Self::SpatialOff => "spatial_off",
            Self::VolumeUp => "volume_up",
            Self::VolumeDown => "volume_down",
            Self::Next => "next",
            Self::Previous => "previous",
        };
        f.write_str(name)
    }
}

/// Keyword groups in match priority order.
const KEYWORDS: &[(VoiceCommand, &[&str])] = &[
    (VoiceCommand::Stop, &["stop", "halt", "pause"]),
    (VoiceCommand::Play, &["play", "start", "resume"]),
    (VoiceCommand::SpatialOn, &["8d on", "spatial on"]),
    (VoiceCommand::SpatialOff, &["8d off", "spatial off"]),
    (VoiceCommand::VolumeUp, &["volume up", "louder", "turn it up"]),
    (VoiceCommand::VolumeDown, &["volume down", "quieter", "softer", "turn it down"]),
    (VoiceCommand::Next, &["next", "skip"]),
    (VoiceCommand::Previous, &["previous", "go back"]),
];

/// Map a transcript to a command, if any keyword group matches.
#[must_use]
pub fn parse_command(transcript: &str) -> Option<VoiceCommand> {
    let normalized = transcript.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| normalized.contains(w)))
        .map(|(command, _)| *command)
}

/// Error reported by the speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Microphone or speech service permission refused.
    PermissionDenied,
    NoSpeech,
    Network,
    AudioCapture,
    Aborted,
    Other(String),
}

impl RecognitionError {
    /// Interpret a recognizer error code (e.g., `"not-allowed"`).
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" | "service-not-allowed" => Self::PermissionDenied,
            "no-speech" => Self::NoSpeech,
            "network" => Self::Network,
            "audio-capture" => Self::AudioCapture,
            "aborted" => Self::Aborted,
            other => Self::Other(other.to_string()),
        }
    }
}

/// What the caller should do with the recognizer next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Restart,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListeningState {
    #[default]
    Idle,
    Listening,
    /// Permission was refused; stays here until an explicit [`VoiceSession::start`].
    Denied,
}

/// Listening lifecycle for continuous recognition.
#[derive(Debug, Default)]
pub struct VoiceSession {
    state: ListeningState,
    last_command: Option<VoiceCommand>,
    restarts: u32,
}

impl VoiceSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> ListeningState {
        self.state
    }

    #[must_use]
    pub const fn is_listening(&self) -> bool {
        matches!(self.state, ListeningState::Listening)
    }

    #[must_use]
    pub const fn last_command(&self) -> Option<VoiceCommand> {
        self.last_command
    }

    /// Automatic restarts since the last explicit start.
    #[must_use]
    pub const fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Begin listening. Also the only way out of [`ListeningState::Denied`].
    pub fn start(&mut self) {
        self.state = ListeningState::Listening;
        self.restarts = 0;
        info!("Voice control started");
    }

    pub fn stop(&mut self) {
        if self.state == ListeningState::Listening {
            self.state = ListeningState::Idle;
            info!("Voice control stopped");
        }
    }

    /// Handle a final transcript while listening.
    pub fn on_transcript(&mut self, transcript: &str) -> Option<VoiceCommand> {
        if !self.is_listening() {
            return None;
        }
        let command = parse_command(transcript)?;
        debug!(%command, "Voice command recognized");
        self.last_command = Some(command);
        Some(command)
    }

    /// Handle a recognizer error.
    ///
    /// Permission denial ends the session; anything else restarts listening.
    pub fn on_error(&mut self, error: &RecognitionError) -> Recovery {
        if *error == RecognitionError::PermissionDenied {
            warn!("Voice recognition permission denied");
            self.state = ListeningState::Denied;
            return Recovery::Stop;
        }
        debug!(?error, "Voice recognition error");
        self.restart_if_listening()
    }

    /// The recognizer ended its stream (it does so periodically).
    pub fn on_end(&mut self) -> Recovery {
        self.restart_if_listening()
    }

    fn restart_if_listening(&mut self) -> Recovery {
        if self.is_listening() {
            self.restarts = self.restarts.saturating_add(1);
            Recovery::Restart
        } else {
            Recovery::Stop
        }
    }
}
