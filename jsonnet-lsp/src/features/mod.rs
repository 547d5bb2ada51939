pub mod completion;
pub mod execute;
pub mod formatting;
pub mod hover;
pub mod symbols;
