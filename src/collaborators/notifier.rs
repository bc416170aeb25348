use async_trait::async_trait;
use tracing::info;

use crate::collaborators::Notifier;
use crate::error::AppError;
use crate::models::driver::OrderNotification;

/// Writes notifications to the log instead of a push provider.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_to_devices(
        &self,
        devices: &[String],
        order: &OrderNotification,
    ) -> Result<(), AppError> {
        for device in devices {
            info!(
                device = %device,
                order_id = %order.id,
                cost = order.cost,
                currency = %order.currency,
                "new trip offer"
            );
        }
        Ok(())
    }

    async fn notify_rider_order_accepted(
        &self,
        devices: &[String],
        order: &OrderNotification,
    ) -> Result<(), AppError> {
        for device in devices {
            info!(device = %device, order_id = %order.id, "order accepted by a driver");
        }
        Ok(())
    }
}
