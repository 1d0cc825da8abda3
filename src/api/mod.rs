mod classifier;
mod client;
mod emotions;
mod history;
mod tokens;
#[cfg(test)]
mod tests;

pub use classifier::{Classification, EmotionClassifierClient};
pub use client::BackendClient;
pub use emotions::{EmotionHistoryClient, HistoryQuery};
pub use history::HistoryRecorder;
pub use tokens::TokenStore;
