//! Classification types shared by task and workflow records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource classification tag (`"VPC"`, `"INSTANCE"`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResourceType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kind of operation a task performs on its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Create,
    Delete,
    Update,
    Attach,
    Detach,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Update => "UPDATE",
            Self::Attach => "ATTACH",
            Self::Detach => "DETACH",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "DELETE" => Ok(Self::Delete),
            "UPDATE" => Ok(Self::Update),
            "ATTACH" => Ok(Self::Attach),
            "DETACH" => Ok(Self::Detach),
            _ => Err(format!("Invalid task type: {s}")),
        }
    }
}

/// What the workflow does to its resources as a whole; callers use it to find
/// the workflow acting on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowNature {
    Create,
    Delete,
    Update,
}

impl WorkflowNature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Update => "UPDATE",
        }
    }
}

impl fmt::Display for WorkflowNature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowNature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "DELETE" => Ok(Self::Delete),
            "UPDATE" => Ok(Self::Update),
            _ => Err(format!("Invalid workflow nature: {s}")),
        }
    }
}

/// Whether a workflow is a top-level workflow or a callback of another one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RootType {
    #[default]
    Normal,
    OnSuccessCallback,
    OnFailureCallback,
}

impl RootType {
    pub fn is_callback(&self) -> bool {
        !matches!(self, Self::Normal)
    }

    /// Callback kind released by a parent outcome
    pub fn callback_for(failed: bool) -> Self {
        if failed {
            Self::OnFailureCallback
        } else {
            Self::OnSuccessCallback
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::OnSuccessCallback => "ON_SUCCESS_CALLBACK",
            Self::OnFailureCallback => "ON_FAILURE_CALLBACK",
        }
    }
}

impl fmt::Display for RootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RootType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(Self::Normal),
            "ON_SUCCESS_CALLBACK" => Ok(Self::OnSuccessCallback),
            "ON_FAILURE_CALLBACK" => Ok(Self::OnFailureCallback),
            _ => Err(format!("Invalid root type: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_is_transparent() {
        let json = serde_json::to_string(&ResourceType::new("VPC")).unwrap();
        assert_eq!(json, "\"VPC\"");
    }

    #[test]
    fn test_callback_kind_for_outcome() {
        assert_eq!(RootType::callback_for(true), RootType::OnFailureCallback);
        assert_eq!(RootType::callback_for(false), RootType::OnSuccessCallback);
        assert!(!RootType::Normal.is_callback());
    }

    #[test]
    fn test_enum_string_round_trip() {
        assert_eq!("DETACH".parse::<TaskType>().unwrap(), TaskType::Detach);
        assert_eq!(
            "ON_FAILURE_CALLBACK".parse::<RootType>().unwrap(),
            RootType::OnFailureCallback
        );
        assert!("create".parse::<WorkflowNature>().is_err());
    }
}
