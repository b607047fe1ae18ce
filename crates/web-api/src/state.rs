use std::sync::Arc;

use application::{
    GroupBroadcaster, HistoryService, MessagePipeline, PresenceTracker, ReadReceiptCoordinator,
};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub message_pipeline: Arc<MessagePipeline>,
    pub presence_tracker: Arc<PresenceTracker>,
    pub read_receipts: Arc<ReadReceiptCoordinator>,
    pub history_service: Arc<HistoryService>,
    pub broadcaster: Arc<dyn GroupBroadcaster>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        message_pipeline: Arc<MessagePipeline>,
        presence_tracker: Arc<PresenceTracker>,
        read_receipts: Arc<ReadReceiptCoordinator>,
        history_service: Arc<HistoryService>,
        broadcaster: Arc<dyn GroupBroadcaster>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            message_pipeline,
            presence_tracker,
            read_receipts,
            history_service,
            broadcaster,
            jwt_service,
        }
    }
}
