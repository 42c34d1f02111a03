pub mod error;
pub mod points;
pub mod types;

pub use error::{EvaError, Result};
pub use types::{
    BackupFilter, BackupRow, BountyAward, BugAttachment, BugReport, BugReportFilter, BugSeverity,
    BugStatus, LeaderboardEntry, MaintenanceFeedback, MirrorRecord, Notification,
    NotificationKind, OgStatus, PointSnapshot, RecoveryLogEntry, RecoveryOperation,
    SessionPoints, SessionRecord, TwitterProfile, User,
};
