pub mod guides;
pub mod prompt;
