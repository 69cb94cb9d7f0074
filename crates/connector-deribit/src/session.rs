use std::sync::Arc;

use connector_core::{create_frame_channel, ChannelGateway, ConnectionStatus, FrameReceiver};
use metrics::SharedMetrics;
use order_manager::{EventReceiver, OrderManager};

pub type SharedOrderManager = Arc<OrderManager<ChannelGateway>>;

/// An order manager plus the two receivers the application must drain.
pub struct DeribitSession {
    pub manager: SharedOrderManager,
    /// Session events for the presentation layer.
    pub events: EventReceiver,
    /// Outbound frames, drained by [`run_connector`](crate::run_connector).
    pub frames: FrameReceiver,
}

pub fn create_session(metrics: SharedMetrics) -> DeribitSession {
    let status = ConnectionStatus::new();
    let (gateway, frames) = create_frame_channel(status.clone());
    let (manager, events) = OrderManager::new(gateway, status, metrics);
    DeribitSession {
        manager: Arc::new(manager),
        events,
        frames,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connector_core::ConnectionState;
    use metrics::create_metrics;

    #[test]
    fn test_requests_refused_until_connected() {
        let mut session = create_session(create_metrics());

        let err = session.manager.currencies().unwrap_err();
        assert!(err.is_transport());
        assert_eq!(session.manager.in_flight(), 0);
        assert!(session.frames.try_recv().is_err());

        session
            .manager
            .connection_status()
            .set(ConnectionState::Connected);
        let id = session.manager.currencies().unwrap();

        let frame = session.frames.try_recv().unwrap();
        assert!(frame.contains("public/get_currencies"));
        assert!(frame.contains(&format!("\"id\":{id}")));
    }
}
