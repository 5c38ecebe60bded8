//! Text-to-speech collaborator stub. The real synthesizer lives behind a
//! Google Cloud service account; without credentials every request resolves
//! to an error future and the simulation runs silent.

use std::time::Duration;

use crate::utils::future::{either_channel, EitherFuture};

pub const CREDENTIALS_ENV: &str = "VICE_GCS_CREDENTIALS";

#[derive(Debug, Clone)]
pub struct SpeechSynthesizer {
    enabled: bool,
}

impl SpeechSynthesizer {
    pub fn from_env() -> Self {
        Self { enabled: std::env::var(CREDENTIALS_ENV).is_ok() }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Kick off synthesis and hand back the result channels. Exactly one of
    /// the two sides fires before both close.
    pub fn synthesize(&self, text: &str) -> EitherFuture<Vec<u8>> {
        let (tx, rx) = either_channel();
        let enabled = self.enabled;
        let text = text.to_string();

        tokio::spawn(async move {
            if !enabled {
                tx.fail(anyhow::anyhow!("speech synthesis is not configured")).await;
                return;
            }
            // Placeholder for the remote call: a short silent clip sized to
            // the utterance.
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.resolve(vec![0u8; text.len().max(1) * 160]).await;
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_synthesizer_errors() {
        let tts = SpeechSynthesizer::disabled();
        let future = tts.synthesize("jetblue four fifty six, turn left heading two three zero");
        assert!(future.wait(Duration::from_secs(1)).await.is_err());
    }
}
