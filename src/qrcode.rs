use std::time::Duration;
use thiserror::Error;

/// Items delivered on a client's pairing channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrCodeEvent {
    Code { code: String, timeout: Duration },
    Success,
    Timeout,
    ClientOutdated,
    ScannedWithoutMultidevice,
    Error(String),
}

impl QrCodeEvent {
    pub fn code(code: impl Into<String>) -> Self {
        QrCodeEvent::Code {
            code: code.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Terminal events end the pairing attempt; the client closes the channel after them.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            QrCodeEvent::Code { .. } | QrCodeEvent::ScannedWithoutMultidevice
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            QrCodeEvent::Code { .. } => "code",
            QrCodeEvent::Success => "success",
            QrCodeEvent::Timeout => "timeout",
            QrCodeEvent::ClientOutdated => "err-client-outdated",
            QrCodeEvent::ScannedWithoutMultidevice => "err-scanned-without-multidevice",
            QrCodeEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum QrError {
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("client is already logged in (store contains a JID)")]
    AlreadyLoggedIn,
    #[error("pairing channel unavailable: {0}")]
    Unavailable(String),
}
