pub mod config;
pub mod constants;
pub mod dcp_time;
pub mod encoded_data;
pub mod eyes;
pub mod film;
pub mod xml_document;
