pub mod embeddings;
pub mod generate;
