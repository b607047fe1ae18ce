pub mod history_service;
pub mod message_pipeline;
pub mod presence_tracker;
pub mod read_receipts;

pub use history_service::{
    HistoryPage, HistoryQuery, HistoryService, HistoryTarget, DEFAULT_PAGE_SIZE,
};
pub use message_pipeline::{MessagePipeline, MessagePipelineDependencies, SendMessageRequest};
pub use presence_tracker::{PresenceTracker, PresenceTrackerDependencies};
pub use read_receipts::{ReadReceiptCoordinator, ReadReceiptDependencies};
