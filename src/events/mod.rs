//! Push-based observability: full task snapshots broadcast per committed
//! transition.

pub mod publisher;

pub use publisher::{EventPublisher, NotificationKind, TaskNotification};
