pub mod request;
pub mod strategies;

pub use request::RequestView;
pub use strategies::*;
