pub mod adapter;
pub mod filter;
pub mod mmr;
pub mod vector;
