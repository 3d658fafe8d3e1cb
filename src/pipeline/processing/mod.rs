pub mod aggregate;
pub mod catalog;
pub mod domain;
pub mod extract;
pub mod normalize;
