pub mod call;
pub mod conference;

pub use call::*;
pub use conference::*;
