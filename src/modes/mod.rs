//! Presentation modes built on a conversation session.

pub mod chat_widget;
pub mod search_bar;

pub use chat_widget::ChatWidget;
pub use search_bar::SearchBar;
