mod notification;
mod table;

pub use notification::{Fields, Notification, Operation, OperationParseError};
pub use table::TableId;
