//! BlockDeviceHandler - manual device block, bypassing the risk threshold.

use std::sync::Arc;
use std::time::Duration;

use super::ModerationError;
use crate::application::fingerprint::DeviceFingerprintEngine;
use crate::domain::fingerprint::{BlockStatus, FingerprintHash, MAX_BLOCK_SECS};
use crate::domain::foundation::{ModeratorId, ValidationError};

#[derive(Debug, Clone)]
pub struct BlockDeviceCommand {
    pub moderator_id: ModeratorId,
    /// Hex digest as shown in the console.
    pub fingerprint: String,
    pub reason: String,
    pub duration_secs: u64,
}

pub struct BlockDeviceHandler {
    fingerprints: Arc<DeviceFingerprintEngine>,
}

impl BlockDeviceHandler {
    pub fn new(fingerprints: Arc<DeviceFingerprintEngine>) -> Self {
        Self { fingerprints }
    }

    pub async fn handle(&self, cmd: BlockDeviceCommand) -> Result<BlockStatus, ModerationError> {
        let hash = FingerprintHash::parse(&cmd.fingerprint)?;
        if cmd.reason.trim().is_empty() {
            return Err(ValidationError::empty_field("reason").into());
        }
        if cmd.duration_secs == 0 || cmd.duration_secs > MAX_BLOCK_SECS {
            return Err(ValidationError::out_of_range(
                "duration_secs",
                1,
                MAX_BLOCK_SECS as i32,
                i32::try_from(cmd.duration_secs).unwrap_or(i32::MAX),
            )
            .into());
        }

        self.fingerprints
            .block(&hash, cmd.reason.trim(), Duration::from_secs(cmd.duration_secs))
            .await?;

        tracing::info!(
            moderator = cmd.moderator_id.as_str(),
            fingerprint = hash.short(),
            reason = cmd.reason.trim(),
            duration_secs = cmd.duration_secs,
            "moderator blocked device"
        );
        Ok(self.fingerprints.is_blocked(&hash).await?)
    }
}
