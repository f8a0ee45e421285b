pub mod digest;
pub mod rsa_certificate_chain;
pub mod xml_package_writer;
