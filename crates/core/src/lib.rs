pub mod config;
pub mod metrics;
pub mod queue;
pub mod submission;
pub mod testing;
pub mod ticket;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig, KafkaConfig,
    QueueBackend, QueueConfig, SanitizedConfig, WorkerConfig,
};
#[cfg(feature = "kafka")]
pub use queue::KafkaQueue;
pub use queue::{Delivery, MemoryQueue, QueueConsumer, QueueError, QueueMessage, QueueTransport};
pub use submission::{
    save_best_effort, ErrorKind, SqliteSubmissionStore, Submission, SubmissionCoordinator,
    SubmissionError, SubmissionMessage, SubmissionMetrics, SubmissionRequest, SubmissionStatus,
    SubmissionStore, SubmissionStoreError, SubmissionWorker, WorkerPool, WorkerPoolStatus,
};
pub use ticket::{
    NewTicket, SqliteTicketStore, Ticket, TicketError, TicketStatus, TicketStore,
};
