//! quizlink-core: content model, term linking and confusable ranking.
//!
//! This crate defines the chapter/concept/question model, the term matcher
//! that links questions to concepts, the similarity ranker that finds
//! confusable concepts, and the audit and generation loops that talk to a
//! language model through [`traits::LlmProvider`].

pub mod audit;
pub mod engine;
pub mod error;
pub mod generate;
pub mod linker;
pub mod matcher;
pub mod model;
pub mod ranker;
pub mod report;
pub mod retry;
pub mod store;
pub mod text;
pub mod traits;
