use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::{ApplyError, ApplyResult};

const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Shortest wait ever granted for an out-of-band code.
pub const MIN_CODE_WAIT: Duration = Duration::from_secs(15);

/// Out-of-band delivery of SMS verification codes.
#[async_trait]
pub trait VerificationCodeSource: Send + Sync {
    /// The code if one has arrived, `None` while still waiting.
    async fn poll(&self, platform: &str, phone: &str) -> Option<String>;
}

/// Never delivers a code.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCodeSource;

#[async_trait]
impl VerificationCodeSource for NoCodeSource {
    async fn poll(&self, _platform: &str, _phone: &str) -> Option<String> {
        None
    }
}

/// Codes pushed through a channel by whatever reads them from the user.
#[derive(Debug)]
pub struct ChannelCodeSource {
    receiver: Mutex<mpsc::Receiver<String>>,
}

impl ChannelCodeSource {
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<String>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                receiver: Mutex::new(receiver),
            },
            sender,
        )
    }
}

#[async_trait]
impl VerificationCodeSource for ChannelCodeSource {
    async fn poll(&self, _platform: &str, _phone: &str) -> Option<String> {
        let mut receiver = self.receiver.lock().await;
        receiver.try_recv().ok().map(|code| code.trim().to_string())
    }
}

pub(crate) fn is_valid_code(code: &str) -> bool {
    (4..=6).contains(&code.len()) && code.chars().all(|ch| ch.is_ascii_digit())
}

/// Polls `source` once a second until a code arrives or `wait` (never less
/// than fifteen seconds) runs out.
pub async fn wait_for_code(
    source: &dyn VerificationCodeSource,
    platform: &str,
    phone: &str,
    wait: Duration,
) -> ApplyResult<String> {
    let wait = wait.max(MIN_CODE_WAIT);
    let deadline = Instant::now() + wait;
    info!(platform, wait_secs = wait.as_secs(), "waiting for verification code");
    loop {
        if let Some(code) = source.poll(platform, phone).await {
            if !is_valid_code(&code) {
                return Err(ApplyError::LoginChallengeUnresolved(
                    "verification code must be 4 to 6 digits".to_string(),
                ));
            }
            debug!(platform, "verification code received");
            return Ok(code);
        }
        if Instant::now() >= deadline {
            return Err(ApplyError::LoginChallengeUnresolved(format!(
                "no verification code within {}s",
                wait.as_secs()
            )));
        }
        sleep(POLL_INTERVAL).await;
    }
}
