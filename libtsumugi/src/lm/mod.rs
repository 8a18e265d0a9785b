pub mod language_model;
pub mod system_bigram_lm;
pub mod system_unigram_lm;
pub mod user_language_model;
