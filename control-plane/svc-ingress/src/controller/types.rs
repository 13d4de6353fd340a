/// How Service update events are suppressed before they reach the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateFilter {
    /// Enqueue only when the marker annotation presence or the declared
    /// ports changed.
    #[default]
    Relevant,
    /// Enqueue whenever old and new objects differ in any field.
    Full,
}

impl UpdateFilter {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "full" => UpdateFilter::Full,
            _ => UpdateFilter::Relevant,
        }
    }
}

impl std::fmt::Display for UpdateFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateFilter::Relevant => write!(f, "relevant"),
            UpdateFilter::Full => write!(f, "full"),
        }
    }
}
