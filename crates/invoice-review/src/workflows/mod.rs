pub mod intake;
pub mod review;
pub mod vat;
