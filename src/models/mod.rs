pub mod certificate;
pub mod registration;
