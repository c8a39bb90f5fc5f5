//! Background reconciliation of PENDING payments.

use tokio::time::{interval, Duration};

use crate::services::payment::PaymentService;

/// Interval derived from the configured minutes; `None` disables the job.
pub fn sync_period(minutes: i64) -> Option<Duration> {
    (minutes > 0).then(|| Duration::from_secs(minutes as u64 * 60))
}

pub async fn start_payment_sync_job(payments: PaymentService, minutes: i64) {
    let Some(period) = sync_period(minutes) else {
        tracing::warn!("payment sync job disabled (interval <= 0)");
        return;
    };

    tokio::spawn(async move {
        let mut interval = interval(period);
        // The first tick fires immediately; skip it so startup is quiet
        interval.tick().await;

        loop {
            interval.tick().await;
            match payments.sync_pending_payments().await {
                Ok(report) if report.total > 0 => {
                    tracing::info!(
                        total = report.total,
                        updated = report.updated,
                        expired = report.expired,
                        failed = report.failed,
                        "scheduled payment sweep completed"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!("scheduled payment sweep failed: {}", e),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_from_minutes() {
        assert_eq!(sync_period(5), Some(Duration::from_secs(300)));
        assert_eq!(sync_period(1), Some(Duration::from_secs(60)));
        assert_eq!(sync_period(0), None);
        assert_eq!(sync_period(-3), None);
    }
}
