use rhythmcat_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MprisError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),
}

impl From<MprisError> for CoreError {
    fn from(err: MprisError) -> Self {
        match err {
            MprisError::Dbus(e) => Self::Dbus {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dbus_failure_is_not_an_audio_error() {
        let err = CoreError::from(MprisError::from(zbus::Error::Failure("no bus".to_string())));
        assert!(matches!(err, CoreError::Dbus { ref reason } if reason.contains("no bus")));
    }
}
