//! UnblockDeviceHandler - lifts a device block.

use std::sync::Arc;

use super::ModerationError;
use crate::application::fingerprint::DeviceFingerprintEngine;
use crate::domain::fingerprint::FingerprintHash;
use crate::domain::foundation::ModeratorId;

#[derive(Debug, Clone)]
pub struct UnblockDeviceCommand {
    pub moderator_id: ModeratorId,
    pub fingerprint: String,
}

pub struct UnblockDeviceHandler {
    fingerprints: Arc<DeviceFingerprintEngine>,
}

impl UnblockDeviceHandler {
    pub fn new(fingerprints: Arc<DeviceFingerprintEngine>) -> Self {
        Self { fingerprints }
    }

    /// Returns false if the device was not blocked.
    pub async fn handle(&self, cmd: UnblockDeviceCommand) -> Result<bool, ModerationError> {
        let hash = FingerprintHash::parse(&cmd.fingerprint)?;
        let lifted = self.fingerprints.unblock(&hash).await?;

        tracing::info!(
            moderator = cmd.moderator_id.as_str(),
            fingerprint = hash.short(),
            lifted,
            "moderator unblocked device"
        );
        Ok(lifted)
    }
}
