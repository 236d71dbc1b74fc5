use std::fmt;

/// Everything that can go wrong in the training core.
///
/// Configuration problems surface synchronously from `start`/`set_wpm`;
/// `AudioUnavailable` is only ever reported as a status, never returned
/// from the session engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DahditError {
    InvalidSpeed(f64),
    InvalidDuration(f64),
    UnknownCharacter(char),
    InvalidToneSpec(String),
    AudioUnavailable(String),
}

impl fmt::Display for DahditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DahditError::InvalidSpeed(wpm) => {
                write!(f, "invalid speed {wpm} wpm: must be a positive number")
            }
            DahditError::InvalidDuration(secs) => {
                write!(f, "invalid session length {secs}s: must be a positive number")
            }
            DahditError::UnknownCharacter(c) => write!(f, "no morse mapping for '{c}'"),
            DahditError::InvalidToneSpec(reason) => write!(f, "invalid tone spec: {reason}"),
            DahditError::AudioUnavailable(reason) => write!(f, "audio unavailable: {reason}"),
        }
    }
}

impl std::error::Error for DahditError {}
