pub mod guards;
pub mod references;
pub mod search;
pub mod structure;
