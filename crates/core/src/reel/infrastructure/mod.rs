pub mod file_reel_writer;
