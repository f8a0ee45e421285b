pub mod certificate_chain;
pub mod composition;
pub mod package_writer;
