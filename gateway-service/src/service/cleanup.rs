//! # Background Cleanup Sweepers
//!
//! Low-frequency tokio task deleting rows whose logical expiry already
//! passed: OTPs, blacklist entries, sessions, authorization codes, OAuth
//! tokens, and device codes.
//!
//! Correctness never depends on the sweeper — every read path filters on
//! `expires_at` — so the task only bounds table growth. Batch sizes are
//! capped to keep each pass short.

use std::time::Duration;

use tracing::{info, warn};

use crate::repository::{
    BlacklistRepository, OAuthTokenRepository, OtpRepository, SessionRepository,
};

/// How often a sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Maximum rows deleted per table per pass.
const SWEEP_BATCH: i64 = 1_000;

/// Repositories the sweeper covers.
#[derive(Clone)]
pub struct CleanupTargets {
    /// Expired OTP rows
    pub otps: OtpRepository,
    /// Lapsed blacklist entries
    pub blacklist: BlacklistRepository,
    /// Expired sessions
    pub sessions: SessionRepository,
    /// Expired codes, tokens, device codes
    pub oauth: OAuthTokenRepository,
}

/// Spawns the periodic sweeper. Runs until the process exits.
pub fn spawn_sweeper(targets: CleanupTargets) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        // The first tick fires immediately; skip it so startup stays quiet
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_sweep(&targets).await;
        }
    })
}

/// One sweep pass. Failures are logged per table and never abort the
/// remaining deletions.
async fn run_sweep(targets: &CleanupTargets) {
    let mut total: u64 = 0;

    match targets.otps.delete_expired(SWEEP_BATCH).await {
        Ok(n) => total += n,
        Err(e) => warn!(error = %e, "otp sweep failed"),
    }

    match targets.blacklist.delete_expired(SWEEP_BATCH).await {
        Ok(n) => total += n,
        Err(e) => warn!(error = %e, "blacklist sweep failed"),
    }

    match targets.sessions.delete_expired(SWEEP_BATCH).await {
        Ok(n) => total += n,
        Err(e) => warn!(error = %e, "session sweep failed"),
    }

    match targets.oauth.delete_expired_codes(SWEEP_BATCH).await {
        Ok(n) => total += n,
        Err(e) => warn!(error = %e, "authorization code sweep failed"),
    }

    match targets.oauth.delete_expired_tokens(SWEEP_BATCH).await {
        Ok(n) => total += n,
        Err(e) => warn!(error = %e, "oauth token sweep failed"),
    }

    match targets.oauth.delete_expired_device_codes(SWEEP_BATCH).await {
        Ok(n) => total += n,
        Err(e) => warn!(error = %e, "device code sweep failed"),
    }

    if total > 0 {
        info!(deleted = total, "cleanup sweep finished");
    }
}
