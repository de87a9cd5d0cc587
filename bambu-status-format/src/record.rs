use serde::{Deserialize, Serialize};

/// CSS class waybar applies to the module
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Running,
    Idle,
    Fault,
}

impl std::fmt::Display for StatusClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusClass::Running => write!(f, "running"),
            StatusClass::Idle => write!(f, "idle"),
            StatusClass::Fault => write!(f, "fault"),
        }
    }
}

/// One status line, superseded entirely by the next one
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DisplayRecord {
    pub text: String,
    pub tooltip: String,
    pub class: StatusClass,
}

impl DisplayRecord {
    /// Encode as a single JSON line without the trailing newline
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Encode as a JSON line terminated by `\n`
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = self.to_json()?;
        Ok(format!("{}\n", json))
    }
}
