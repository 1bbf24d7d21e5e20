use depot_core::{AppError, Record};
use uuid::Uuid;

/// Anything an index operation can address a record by.
///
/// Strings are checked to be hyphenated UUIDs before any query is issued.
pub trait RecordKey {
    fn record_id(&self) -> Result<Uuid, AppError>;
}

impl RecordKey for Uuid {
    fn record_id(&self) -> Result<Uuid, AppError> {
        Ok(*self)
    }
}

impl RecordKey for str {
    fn record_id(&self) -> Result<Uuid, AppError> {
        if self.len() != 36 {
            return Err(AppError::Validation(format!("Invalid id: {:?}", self)));
        }
        Uuid::parse_str(self).map_err(|_| AppError::Validation(format!("Invalid id: {:?}", self)))
    }
}

impl RecordKey for String {
    fn record_id(&self) -> Result<Uuid, AppError> {
        self.as_str().record_id()
    }
}

impl RecordKey for Record {
    fn record_id(&self) -> Result<Uuid, AppError> {
        Ok(self.id)
    }
}

impl<T: RecordKey + ?Sized> RecordKey for &T {
    fn record_id(&self) -> Result<Uuid, AppError> {
        (**self).record_id()
    }
}
