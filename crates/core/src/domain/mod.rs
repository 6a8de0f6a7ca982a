pub mod invoice;
pub mod organization;
