use serde::{Deserialize, Serialize};

/// Short action candidates derived from a reply, at most four
pub type SuggestionList = Vec<String>;

/// Result of one completed one-shot search, handed to the host page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResultPayload {
    /// Query as typed by the user
    pub query: String,
    /// Full reply text
    pub response: String,
    pub suggestions: SuggestionList,
}
