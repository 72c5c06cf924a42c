use crate::channel::DataChannel;
use crate::types::TransferConfig;
use crate::TransferError;

/// Suspends until the channel's buffered amount is at or below the
/// high-water mark, rechecking every `poll_interval`.
///
/// Fails with [`TransferError::ChannelClosed`] if the channel stops being
/// open before or during the wait. There is no upper bound on the wait.
pub async fn wait_for_capacity<C>(channel: &C, config: &TransferConfig) -> Result<(), TransferError>
where
    C: DataChannel + ?Sized,
{
    if !channel.is_open() {
        return Err(TransferError::ChannelClosed);
    }
    if channel.buffered_amount() <= config.high_water_mark {
        return Ok(());
    }

    tracing::debug!(
        channel = %channel.label(),
        buffered = channel.buffered_amount(),
        high_water_mark = config.high_water_mark,
        "applying backpressure, waiting for buffer to drain"
    );

    loop {
        tokio::time::sleep(config.poll_interval()).await;
        if !channel.is_open() {
            tracing::warn!(channel = %channel.label(), "channel closed during backpressure wait");
            return Err(TransferError::ChannelClosed);
        }
        if channel.buffered_amount() <= config.high_water_mark {
            return Ok(());
        }
    }
}
