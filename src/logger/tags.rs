/// Log tags identify the subsystem a message comes from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    Cache,
    Rpc,
    System,
    Other(String),
}

impl LogTag {
    /// Key used for per-tag debug/verbose switches
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::Cache => "cache".to_string(),
            LogTag::Rpc => "rpc".to_string(),
            LogTag::System => "system".to_string(),
            LogTag::Other(name) => name.to_lowercase(),
        }
    }

    /// Uppercase label without colors, used for the console prefix
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::Other(name) => name.to_uppercase(),
            tag => tag.to_debug_key().to_uppercase(),
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}
