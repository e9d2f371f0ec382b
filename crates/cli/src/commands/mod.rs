pub mod instancetypes;
pub mod shapes;
pub mod unavailable;
