use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::TableId;

/// Field name -> value mapping of a table row, as delivered upstream
pub type Fields = HashMap<String, String>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Set,
    Delete,
}

#[derive(Debug, Error, PartialEq)]
#[error("Unsupported operation: '{0}'")]
pub struct OperationParseError(pub String);

impl FromStr for Operation {
    type Err = OperationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SET" => Ok(Operation::Set),
            "DEL" | "DELETE" => Ok(Operation::Delete),
            _ => Err(OperationParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            Operation::Set => "SET",
            Operation::Delete => "DEL",
        };
        write!(f, "{}", word)
    }
}

impl Serialize for Operation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D>(deserializer: D) -> Result<Operation, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single change event for a row of a table
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub table: TableId,
    pub key: String,
    pub op: Operation,
    pub fields: Fields,
}

impl Notification {
    pub fn set(table: TableId, key: impl Into<String>, fields: Fields) -> Self {
        Self {
            table,
            key: key.into(),
            op: Operation::Set,
            fields,
        }
    }

    pub fn delete(table: TableId, key: impl Into<String>) -> Self {
        Self {
            table,
            key: key.into(),
            op: Operation::Delete,
            fields: Fields::new(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Notification {} {} '{}' fields={}>",
            self.table,
            self.op,
            self.key,
            self.fields.len()
        )
    }
}
