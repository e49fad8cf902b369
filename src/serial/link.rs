//! Trait abstraction for the serial connection to enable testing

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Byte-stream link to the instrument
///
/// Both halves of the conversation go over the same handle: the ingestion
/// loop reads from it while the control surface writes outbound commands.
/// The two directions are independent, so a write can never corrupt an
/// in-progress read.
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> SerialLink for T {}

/// Factory for serial links
///
/// The production implementation opens a real serial port; tests substitute
/// scripted in-memory links.
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    /// Concrete link type produced by this connector
    type Link: SerialLink;

    /// Establish a fresh link to the instrument
    ///
    /// # Errors
    ///
    /// Returns `ThermolinkError::Connection` if the link cannot be opened.
    async fn connect(&self) -> Result<Self::Link>;
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use crate::error::ThermolinkError;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::io::DuplexStream;

    /// Outcome of one scripted connection attempt
    pub enum Attempt {
        /// Hand out this in-memory link
        Link(DuplexStream),
        /// Refuse the connection
        Refuse,
    }

    /// Fake connector that replays a script of connection attempts
    ///
    /// Once the script is exhausted, every further attempt is refused, so
    /// an ingestion loop under test settles into its backoff cycle until
    /// it is cancelled.
    pub struct FakeConnector {
        attempts: Mutex<VecDeque<Attempt>>,
    }

    impl FakeConnector {
        pub fn new(attempts: Vec<Attempt>) -> Self {
            Self {
                attempts: Mutex::new(attempts.into()),
            }
        }
    }

    #[async_trait]
    impl Connect for FakeConnector {
        type Link = DuplexStream;

        async fn connect(&self) -> Result<DuplexStream> {
            let next = self.attempts.lock().unwrap().pop_front();
            match next {
                Some(Attempt::Link(link)) => Ok(link),
                Some(Attempt::Refuse) | None => {
                    Err(ThermolinkError::Connection("no device".to_string()))
                }
            }
        }
    }
}
