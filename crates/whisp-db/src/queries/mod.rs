mod friends;
mod messages;
mod notifications;
mod sweep;
mod users;

pub use friends::ordered_pair;
pub use messages::MarkReadOutcome;
pub use messages::CleanupCheck;
pub use sweep::SweepCounts;

use anyhow::Result;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
