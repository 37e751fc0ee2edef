pub mod category;
pub mod market;
pub mod oracle;
pub mod ratio;
pub mod token;

pub use category::*;
pub use market::*;
pub use oracle::*;
pub use ratio::*;
pub use token::*;
