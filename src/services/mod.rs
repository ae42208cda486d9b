pub mod bundle;
pub mod envelope;
pub mod lifecycle;
pub mod object_index;
pub mod share_service;
