pub mod embedding;
pub mod runner;
pub mod store;
pub mod validator;

pub use embedding::EmbeddingProvider;
pub use runner::{SnippetOutput, SnippetRunner, StoreView};
pub use store::{LayerQuery, LayerStore, ScoredItem};
pub use validator::{LlmValidator, ValidationRequest, ValidationResponse, Verdict};
