pub mod config;
pub mod dict;
pub mod engine;
pub mod graph;
pub mod lisp;
pub mod lm;
pub mod romkan;
