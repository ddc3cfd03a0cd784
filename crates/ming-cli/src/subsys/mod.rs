//! Subsystems started once the object layer is installed

pub mod cache;
pub mod coordination;
pub mod dns;
pub mod iam;
pub mod notification;

pub use cache::DiskCache;
pub use coordination::CoordinationStore;
pub use dns::DnsFederator;
pub use iam::{IamSys, ObjectIamSys};
pub use notification::{BucketEvent, EventName, EventNotifier, NotificationSys, NOTIFICATION_BACKENDS};

use std::sync::Arc;

/// Subsystem implementations handed to the bootstrap sequence.
///
/// Notification and IAM fall back to [`EventNotifier`] and [`ObjectIamSys`]
/// when unset; coordination and DNS federation only run when provided.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub notification: Option<Arc<dyn NotificationSys>>,
    pub coordination: Option<Arc<dyn CoordinationStore>>,
    pub iam: Option<Arc<dyn IamSys>>,
    pub dns: Option<Arc<dyn DnsFederator>>,
}

impl Collaborators {
    pub fn with_notification(mut self, notification: Arc<dyn NotificationSys>) -> Self {
        self.notification = Some(notification);
        self
    }

    pub fn with_coordination(mut self, store: Arc<dyn CoordinationStore>) -> Self {
        self.coordination = Some(store);
        self
    }

    pub fn with_iam(mut self, iam: Arc<dyn IamSys>) -> Self {
        self.iam = Some(iam);
        self
    }

    pub fn with_dns(mut self, dns: Arc<dyn DnsFederator>) -> Self {
        self.dns = Some(dns);
        self
    }
}
