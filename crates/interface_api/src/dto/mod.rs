//! Request and response bodies

pub mod payments;
