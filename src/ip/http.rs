use thiserror::Error;

use crate::http::{Error, Request};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("HTTP transport error: {0}")]
    Transport(Box<str>),
}

/// Retrieves the body of a "what is my IP" endpoint.
pub trait Fetch {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// [`Fetch`] over the configured HTTP backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpFetcher;

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = match Request::get(url).call() {
            Ok(r) => r,
            Err(Error::Status(code, _)) => Err(FetchError::Status(code))?,
            Err(Error::Transport(t)) => Err(FetchError::Transport(t))?,
        };

        response
            .into_string()
            .map_err(|e| FetchError::Transport(e.to_string().into()))
    }
}

#[cfg(test)]
pub use scripted::ScriptedFetcher;

#[cfg(test)]
mod scripted {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::{Fetch, FetchError};

    /// Replays canned responses in order. The last response is repeated
    /// once the script runs out.
    #[derive(Debug)]
    pub struct ScriptedFetcher {
        script: RefCell<VecDeque<Result<String, FetchError>>>,
        urls: RefCell<Vec<String>>,
    }

    impl ScriptedFetcher {
        pub fn new(script: Vec<Result<String, FetchError>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                urls: RefCell::new(Vec::new()),
            }
        }

        pub fn always(response: Result<&str, FetchError>) -> Self {
            Self::new(vec![response.map(String::from)])
        }

        pub fn calls(&self) -> usize {
            self.urls.borrow().len()
        }

        pub fn urls(&self) -> Vec<String> {
            self.urls.borrow().clone()
        }
    }

    impl Fetch for ScriptedFetcher {
        fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.urls.borrow_mut().push(url.to_owned());

            let mut script = self.script.borrow_mut();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
            .unwrap_or_else(|| Err(FetchError::Transport("script exhausted".into())))
        }
    }
}
