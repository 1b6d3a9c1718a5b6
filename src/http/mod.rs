#[cfg(feature = "curl")]
#[cfg(feature = "ureq")]
#[error("The features `curl` and `ureq` must not be enabled together!")]
const FORCED_ERROR: u8 = 1 / 0;

#[cfg(feature = "curl")]
mod curl_backend;

#[cfg(feature = "ureq")]
mod ureq_backend;

use std::fmt;
use std::io::{self, Read};
use std::time::Duration;

#[cfg(feature = "curl")]
pub use curl_backend::Request;

#[cfg(feature = "ureq")]
pub use ureq_backend::Request;

use crate::GENERAL_CONFIG;

/// Extra request headers, applied in order.
pub type Headers = Vec<(Box<str>, Box<str>)>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Response {
    pub(self) reader: Box<dyn Read>,
}

pub enum Error {
    Status(u16, Response),
    Transport(Box<str>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Status(code, _) => write!(f, "HTTP status {}", code),
            Error::Transport(tp) => write!(f, "transport error: {}", tp),
        }
    }
}

impl Response {
    pub fn into_string(self) -> Result<String, io::Error> {
        let mut vec = Vec::with_capacity(1024);
        let read = self.reader.take(2 * 1024 * 1024).read_to_end(&mut vec)?;
        vec.resize(read, 0);
        String::from_utf8(vec).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// The User-Agent sent with every request. Falls back to the crate default
/// when no configuration has been installed yet.
fn user_agent() -> Box<str> {
    match GENERAL_CONFIG.get() {
        Some(general) => general.user_agent.clone(),
        None => crate::config::default_user_agent(),
    }
}

/// Every request is bounded by this timeout so a hung peer cannot stall the
/// polling loop.
fn timeout() -> Duration {
    GENERAL_CONFIG
        .get()
        .map(|general| Duration::from_secs(general.timeout.get() as u64))
        .unwrap_or(DEFAULT_TIMEOUT)
}
